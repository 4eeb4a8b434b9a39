//! Remote habits backend.
//!
//! [`HabitsGateway`] is the contract the month controller depends on;
//! [`HttpGateway`] implements it against the REST API.

mod http;

pub use http::HttpGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::date_window::YearMonth;
use crate::error::RemoteError;
use crate::habit::{CompletionDays, HabitId, HabitRecord};

/// Result type for gateway calls
pub type GatewayResult<T> = std::result::Result<T, RemoteError>;

/// Operations the habits backend must support.
#[async_trait]
pub trait HabitsGateway: Send + Sync {
    /// First month with habit data, or `None` for a user with no habits yet.
    async fn start_month(&self) -> GatewayResult<Option<YearMonth>>;

    /// All habits shaped for `month`, in server order.
    async fn list_habits(&self, month: YearMonth) -> GatewayResult<Vec<HabitRecord>>;

    async fn create_habit(&self, name: &str) -> GatewayResult<CreateHabitResponse>;

    /// Flip one day and return the authoritative day map.
    async fn toggle_day(
        &self,
        habit_id: &HabitId,
        day: u32,
        month: YearMonth,
    ) -> GatewayResult<ToggleResponse>;

    async fn rename_habit(&self, habit_id: &HabitId, name: &str) -> GatewayResult<Ack>;

    async fn delete_habit(&self, habit_id: &HabitId) -> GatewayResult<Ack>;
}

/// Body of `GET /habits/start`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMonth {
    pub start_month: Option<u32>,
    pub start_year: Option<i32>,
}

impl StartMonth {
    #[must_use]
    pub fn to_year_month(&self) -> Option<YearMonth> {
        let month = YearMonth::new(self.start_month?, self.start_year?);
        month.is_valid().then_some(month)
    }
}

/// A habit as echoed back by `POST /habits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedHabit {
    #[serde(alias = "_id", alias = "id")]
    pub habit_id: HabitId,
    pub name: String,
}

/// Body of `POST /habits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateHabitResponse {
    #[serde(default = "accepted")]
    pub success: bool,
    #[serde(default)]
    pub habit: Option<CreatedHabit>,
}

/// Body of `PATCH /habits/{id}/toggle`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub days: CompletionDays,
}

/// Acknowledgement returned by rename and delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default = "accepted")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl Ack {
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// Turn `success: false` into [`RemoteError::Rejected`].
    ///
    /// # Errors
    ///
    /// Returns the rejection, carrying the server's message when it sent one.
    pub fn into_result(self, operation: &str) -> GatewayResult<()> {
        if self.success {
            Ok(())
        } else {
            Err(RemoteError::rejected(
                self.message
                    .unwrap_or_else(|| format!("{operation} was not accepted")),
            ))
        }
    }
}

/// A 2xx body without a `success` field counts as accepted.
const fn accepted() -> bool {
    true
}
