//! Field state, submission and result rendering for the prediction form.

use std::fmt;

use crate::models::{PredictRequest, PredictResponse, Sex};

use super::ApiClient;

/// Raw text of every form field, as typed.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictForm {
    pub sex: Sex,
    pub age: String,
    pub length_of_stay_days: String,
    pub avg_hemo: String,
    pub avg_glucose: String,
    pub avg_creatinine: String,
    pub avg_wbc: String,
    pub avg_platelets: String,
}

impl Default for PredictForm {
    fn default() -> Self {
        Self {
            sex: Sex::Female,
            age: "65".into(),
            length_of_stay_days: "3.2".into(),
            avg_hemo: "12.5".into(),
            avg_glucose: "140".into(),
            avg_creatinine: "1.0".into(),
            avg_wbc: "8.0".into(),
            avg_platelets: "230".into(),
        }
    }
}

fn required<T: std::str::FromStr>(label: &str, raw: &str) -> Result<T, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("{label} must be a number, got {raw:?}"))
}

fn optional(label: &str, raw: &str) -> Result<Option<f64>, String> {
    if raw.trim().is_empty() {
        Ok(None)
    } else {
        required(label, raw).map(Some)
    }
}

impl PredictForm {
    /// Parses the fields; blank lab fields become nulls.
    pub fn to_request(&self) -> Result<PredictRequest, String> {
        Ok(PredictRequest {
            sex: self.sex.code().to_string(),
            age: required("Age", &self.age)?,
            length_of_stay_days: required("Length of stay", &self.length_of_stay_days)?,
            avg_hemo: optional("Avg Hemoglobin", &self.avg_hemo)?,
            avg_glucose: optional("Avg Glucose", &self.avg_glucose)?,
            avg_creatinine: optional("Avg Creatinine", &self.avg_creatinine)?,
            avg_wbc: optional("Avg WBC", &self.avg_wbc)?,
            avg_platelets: optional("Avg Platelets", &self.avg_platelets)?,
        })
    }

    pub async fn submit(&self, client: &ApiClient) -> Submission {
        let payload = match self.to_request() {
            Ok(payload) => payload,
            Err(reason) => return Submission::Invalid(reason),
        };
        match client.predict(&payload).await {
            Ok(response) => Submission::Scored { payload, response },
            Err(err) => Submission::Failed {
                error: err.reason(),
                api_url: client.base_url().to_string(),
            },
        }
    }
}

/// Outcome of one form submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Scored {
        payload: PredictRequest,
        response: PredictResponse,
    },
    Failed {
        error: String,
        api_url: String,
    },
    Invalid(String),
}

impl Submission {
    pub fn is_high_risk(&self) -> bool {
        matches!(self, Submission::Scored { response, .. } if response.label == 1)
    }

    pub fn headline(&self) -> String {
        match self {
            Submission::Scored { response, .. } => {
                format!("Readmission probability: {:.2}%", response.probability * 100.0)
            }
            Submission::Failed { error, .. } => format!("Request failed: {error}"),
            Submission::Invalid(reason) => format!("Invalid input: {reason}"),
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Submission::Scored { response, .. } if response.label == 1 => {
                "Prediction: HIGH RISK".into()
            }
            Submission::Scored { .. } => "Prediction: LOW RISK".into(),
            Submission::Failed { api_url, .. } => {
                format!("Is the API running at {api_url}? Try: curl {api_url}/health")
            }
            Submission::Invalid(_) => String::new(),
        }
    }
}

impl fmt::Display for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.headline())?;
        let detail = self.detail();
        if !detail.is_empty() {
            writeln!(f, "{detail}")?;
        }
        if let Submission::Scored { payload, .. } = self {
            let json = serde_json::to_string_pretty(payload).map_err(|_| fmt::Error)?;
            writeln!(f, "{json}")?;
        }
        Ok(())
    }
}
