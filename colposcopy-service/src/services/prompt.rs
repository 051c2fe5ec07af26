//! Instruction text sent to the vision model alongside the image.
//!
//! The wording pins the model to a three-section report with fixed headers
//! so the front-end can render it without further parsing.

use std::fmt;
use std::str::FromStr;

/// Language the report (and therefore the instruction) is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportLanguage {
    #[default]
    English,
    Spanish,
}

/// Section headers, in output order.
pub struct SectionHeaders {
    pub observations: &'static str,
    pub diagnosis: &'static str,
    pub recommendations: &'static str,
}

impl ReportLanguage {
    pub fn code(self) -> &'static str {
        match self {
            ReportLanguage::English => "en",
            ReportLanguage::Spanish => "es",
        }
    }

    pub fn headers(self) -> SectionHeaders {
        match self {
            ReportLanguage::English => SectionHeaders {
                observations: "Main Observations:",
                diagnosis: "Possible Diagnosis:",
                recommendations: "Recommendations:",
            },
            ReportLanguage::Spanish => SectionHeaders {
                observations: "Observaciones Principales:",
                diagnosis: "Posible Diagnóstico:",
                recommendations: "Recomendaciones:",
            },
        }
    }
}

impl fmt::Display for ReportLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ReportLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(ReportLanguage::English),
            "es" | "spanish" | "español" => Ok(ReportLanguage::Spanish),
            other => Err(format!("unsupported report language '{}' (expected en or es)", other)),
        }
    }
}

/// Build the instruction for one analysis.
///
/// `medical_history` is interpolated verbatim: no escaping, trimming or
/// truncation, so whatever the clinician typed reaches the model unchanged.
pub fn build_prompt(language: ReportLanguage, medical_history: &str) -> String {
    let headers = language.headers();

    let preamble = match language {
        ReportLanguage::English => format!(
            "Generate a technical, concise colposcopic report based on the following image. \
             Consider the Squamocolumnar Junction, the Transformation Zone and the Ectocervix. \
             Integrate the patient's medical history if relevant: \"{}\". \
             The report must be professional, structured in sections and written in English. \
             Avoid introductory or conversational phrases. \
             Use exactly the following format for sections and bullet points:",
            medical_history
        ),
        ReportLanguage::Spanish => format!(
            "Genera un informe colposcópico técnico y conciso basado en la siguiente imagen. \
             Considera la Unión Escamocolumnar, la Zona de Transformación y el Exocérvix. \
             Integra el historial médico del paciente si es relevante: \"{}\". \
             El informe debe ser profesional, estructurado en secciones y estar en español. \
             Evita frases introductorias o conversacionales. \
             Utiliza el siguiente formato exacto para las secciones y viñetas:",
            medical_history
        ),
    };

    let (observation, diagnosis, recommendation) = match language {
        ReportLanguage::English => ("Observation", "Diagnosis", "Recommendation"),
        ReportLanguage::Spanish => ("Observación", "Diagnóstico", "Recomendación"),
    };

    format!(
        "{preamble}\n\
         {obs_header}\n\
         - [{observation} 1]\n\
         - [{observation} 2]\n\
         \n\
         {diag_header}\n\
         - [{diagnosis} 1]\n\
         \n\
         {rec_header}\n\
         - [{recommendation} 1]\n\
         - [{recommendation} 2]",
        obs_header = headers.observations,
        diag_header = headers.diagnosis,
        rec_header = headers.recommendations,
    )
}
