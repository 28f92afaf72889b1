//! Request and response bodies of the prediction service.

use arrow::datatypes::FieldRef;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Deserializer, Serialize};
use serde_arrow::schema::{SchemaLike, TracingOptions};
use validator::{Validate, ValidationError};

use super::Sex;
use crate::error::Result;

/// One encounter to score. Lab averages are optional and imputed when absent.
///
/// Field names match the mart columns the model was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PredictRequest {
    #[validate(custom = "validate_sex")]
    pub sex: String,
    #[validate(range(min = 0, max = 120))]
    #[serde(deserialize_with = "deserialize_whole_number")]
    pub age: i64,
    #[validate(range(min = 0.0))]
    pub length_of_stay_days: f64,
    pub avg_hemo: Option<f64>,
    pub avg_glucose: Option<f64>,
    pub avg_creatinine: Option<f64>,
    pub avg_wbc: Option<f64>,
    pub avg_platelets: Option<f64>,
}

fn validate_sex(sex: &str) -> std::result::Result<(), ValidationError> {
    if Sex::ALL.iter().any(|s| s.code() == sex) {
        Ok(())
    } else {
        Err(ValidationError::new("sex must be M or F"))
    }
}

/// Accepts `65` as well as an integral float such as `65.0`; `65.5` is rejected.
fn deserialize_whole_number<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct WholeNumber;

    impl<'de> de::Visitor<'de> for WholeNumber {
        type Value = i64;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a whole number")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<i64, E> {
            i64::try_from(v).map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<i64, E> {
            // 2^53: beyond this not every integer is representable
            if v.is_finite() && v.fract() == 0.0 && v.abs() <= 9_007_199_254_740_992.0 {
                Ok(v as i64)
            } else {
                Err(E::invalid_value(de::Unexpected::Float(v), &self))
            }
        }
    }

    deserializer.deserialize_i64(WholeNumber)
}

impl PredictRequest {
    /// The request as a one-row batch, one column per field.
    pub fn to_batch(&self) -> Result<RecordBatch> {
        let rows = std::slice::from_ref(self);
        let fields = Vec::<FieldRef>::from_samples(
            &rows,
            TracingOptions::default().allow_null_fields(true),
        )?;
        Ok(serde_arrow::to_record_batch(&fields, &rows)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub probability: f64,
    pub label: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{frame, LabTest};

    fn request() -> PredictRequest {
        PredictRequest {
            sex: "F".into(),
            age: 65,
            length_of_stay_days: 3.2,
            avg_hemo: None,
            avg_glucose: Some(140.0),
            avg_creatinine: None,
            avg_wbc: None,
            avg_platelets: None,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn bad_fields_fail_validation() {
        let bad_sex = PredictRequest {
            sex: "X".into(),
            ..request()
        };
        assert!(bad_sex.validate().is_err());

        let old = PredictRequest {
            age: 121,
            ..request()
        };
        assert!(old.validate().is_err());

        let negative_stay = PredictRequest {
            length_of_stay_days: -0.5,
            ..request()
        };
        assert!(negative_stay.validate().is_err());
    }

    #[test]
    fn integral_float_ages_are_accepted() {
        let mut body = serde_json::to_value(request()).unwrap();
        body["age"] = serde_json::json!(65.0);
        let parsed: PredictRequest = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(parsed.age, 65);

        body["age"] = serde_json::json!(65.5);
        assert!(serde_json::from_value::<PredictRequest>(body.clone()).is_err());

        body["age"] = serde_json::json!("65");
        assert!(serde_json::from_value::<PredictRequest>(body).is_err());
    }

    #[test]
    fn batch_uses_mart_columns() {
        let batch = request().to_batch().unwrap();
        assert_eq!(batch.num_rows(), 1);
        for test in LabTest::ALL {
            assert!(frame::has_column(&batch, test.mart_column()));
        }
        assert_eq!(
            frame::numeric_column(&batch, "avg_glucose").unwrap(),
            Some(vec![Some(140.0)])
        );
        assert_eq!(
            frame::numeric_column(&batch, "avg_hemo").unwrap(),
            Some(vec![None])
        );
        assert_eq!(
            frame::numeric_column(&batch, "age").unwrap(),
            Some(vec![Some(65.0)])
        );
        assert_eq!(
            frame::text_column(&batch, "sex").unwrap(),
            Some(vec![Some("F".to_string())])
        );
        assert_eq!(batch.num_columns(), 8);
    }
}
