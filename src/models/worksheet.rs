use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a worksheet row. A worksheet only gets a file path once it
/// reaches `Completed`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorksheetStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl WorksheetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorksheetStatus::Pending => "pending",
            WorksheetStatus::Processing => "processing",
            WorksheetStatus::Completed => "completed",
            WorksheetStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for WorksheetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorksheetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorksheetStatus::Pending),
            "processing" => Ok(WorksheetStatus::Processing),
            "completed" => Ok(WorksheetStatus::Completed),
            "failed" => Ok(WorksheetStatus::Failed),
            other => Err(format!("unknown worksheet status '{}'", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Worksheet {
    pub id: i64,
    pub user_id: i64,
    pub subject: String,
    pub difficulty: String,
    pub num_problems: u32,
    pub additional_info: Option<String>,
    pub file_path: Option<String>,
    pub status: WorksheetStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Worksheet {
    pub fn request(&self) -> WorksheetRequest {
        WorksheetRequest {
            subject: self.subject.clone(),
            difficulty: self.difficulty.clone(),
            num_problems: self.num_problems,
            additional_info: self.additional_info.clone().unwrap_or_default(),
        }
    }
}

/// Parameters the generation pipeline needs.
#[derive(Debug, Clone, PartialEq)]
pub struct WorksheetRequest {
    pub subject: String,
    pub difficulty: String,
    pub num_problems: u32,
    pub additional_info: String,
}
