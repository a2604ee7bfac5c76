use chrono::SecondsFormat;
use serde::{Deserialize, Deserializer, Serialize};

use crate::application::{HistoryEntry, PlayerBalance};
use crate::domain::{format_cents, parse_cents, Cents, Direction, EntryId};

/// Body of `POST /v1/wallets/withdraw` and `/deposit`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRequest {
    pub player_id: String,
    /// JSON number or decimal string, at most two fractional digits
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: Cents,
    pub reference: String,
    pub idempotency_key: String,
}

fn deserialize_amount<'de, D>(deserializer: D) -> Result<Cents, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Number(serde_json::Number),
        Text(String),
    }

    let text = match RawAmount::deserialize(deserializer)? {
        RawAmount::Number(n) => n.to_string(),
        RawAmount::Text(s) => s,
    };
    parse_cents(&text).map_err(serde::de::Error::custom)
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub tx_id: EntryId,
    pub balance: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub player_id: String,
    pub balance: String,
}

impl From<PlayerBalance> for BalanceResponse {
    fn from(balance: PlayerBalance) -> Self {
        Self {
            player_id: balance.player_id,
            balance: format_cents(balance.balance_cents),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: EntryId,
    pub amount: String,
    pub direction: Direction,
    pub reference: String,
    pub timestamp: String,
}

impl From<HistoryEntry> for TransactionView {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            id: entry.id,
            amount: format_cents(entry.amount_cents),
            direction: entry.direction,
            reference: entry.reference,
            timestamp: entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    pub player_id: String,
    pub transactions: Vec<TransactionView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
