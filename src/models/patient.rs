use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "M")]
    Male,
}

impl Sex {
    pub const ALL: [Sex; 2] = [Sex::Female, Sex::Male];

    pub fn code(self) -> &'static str {
        match self {
            Sex::Female => "F",
            Sex::Male => "M",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "F" => Ok(Sex::Female),
            "M" => Ok(Sex::Male),
            other => Err(format!("sex must be M or F, got {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: String,
    pub sex: Sex,
    pub age: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub enc_id: String,
    pub patient_id: String,
    pub admit_ts: NaiveDateTime,
    pub discharge_ts: NaiveDateTime,
    pub readmit_30d: bool,
}

impl Encounter {
    pub fn length_of_stay_days(&self) -> f64 {
        (self.discharge_ts - self.admit_ts).num_milliseconds() as f64 / 86_400_000.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResult {
    pub enc_id: String,
    pub test_name: String,
    pub value: f64,
    pub taken_ts: NaiveDateTime,
}

/// Lab panels drawn by the synthetic seeder and averaged in the mart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabTest {
    Hemoglobin,
    Glucose,
    Creatinine,
    Wbc,
    Platelets,
}

impl LabTest {
    pub const ALL: [LabTest; 5] = [
        LabTest::Hemoglobin,
        LabTest::Glucose,
        LabTest::Creatinine,
        LabTest::Wbc,
        LabTest::Platelets,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LabTest::Hemoglobin => "hemoglobin",
            LabTest::Glucose => "glucose",
            LabTest::Creatinine => "creatinine",
            LabTest::Wbc => "wbc",
            LabTest::Platelets => "platelets",
        }
    }

    /// Column holding the per-encounter average in the mart table.
    pub fn mart_column(self) -> &'static str {
        match self {
            LabTest::Hemoglobin => "avg_hemo",
            LabTest::Glucose => "avg_glucose",
            LabTest::Creatinine => "avg_creatinine",
            LabTest::Wbc => "avg_wbc",
            LabTest::Platelets => "avg_platelets",
        }
    }

    /// Uniform sampling range used by the seeder.
    pub fn normal_range(self) -> (f64, f64) {
        match self {
            LabTest::Hemoglobin => (11.0, 16.0),
            LabTest::Glucose => (70.0, 180.0),
            LabTest::Creatinine => (0.5, 1.6),
            LabTest::Wbc => (4.0, 11.0),
            LabTest::Platelets => (150.0, 450.0),
        }
    }
}
