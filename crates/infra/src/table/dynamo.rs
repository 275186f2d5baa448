//! DynamoDB-backed player table.
//!
//! Maps the `PlayerTable` contract onto DynamoDB calls:
//!
//! | Operation     | DynamoDB call                                              |
//! |---------------|------------------------------------------------------------|
//! | `put`         | `PutItem`                                                  |
//! | `put_new`     | `TransactWriteItems` (guard item + player), or `PutItem`   |
//! | `update_set`  | `UpdateItem` `SET`, `attribute_exists(id)`, `ALL_NEW`      |
//! | `scan_all`    | `Scan`, following `LastEvaluatedKey`                       |
//! | `query_index` | `Query` on the index, following `LastEvaluatedKey`         |
//!
//! ## Error Mapping
//!
//! | Error                                                  | TableError        |
//! |--------------------------------------------------------|-------------------|
//! | `ConditionalCheckFailedException`                      | `ConditionFailed` |
//! | `ConditionalCheckFailedException` from `update_item`   | `NotFound`        |
//! | `TransactionCanceledException`, `ConditionalCheckFailed` reason | `ConditionFailed` |
//! | `TransactionCanceledException`, throttling reason      | `Throttled`       |
//! | `TransactionCanceledException`, any other reason       | `Backend`         |
//! | `ProvisionedThroughputExceededException`               | `Throttled`       |
//! | `ThrottlingException`, `RequestLimitExceeded`          | `Throttled`       |
//! | anything else                                          | `Backend`         |

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::{AttributeValue, Put, ReturnValue, TransactWriteItem};
use aws_sdk_dynamodb::Client;
use serde_json::{Map, Number, Value as JsonValue};
use tracing::{debug, info, instrument};

use clouddart_core::PlayerId;
use clouddart_players::Player;

use super::{PlayerTable, TableError, EMAIL_ATTRIBUTE, ID_ATTRIBUTE};
use crate::config::TableConfig;

type Item = HashMap<String, AttributeValue>;

/// Player table stored in DynamoDB.
///
/// The table is keyed by `id` (string hash key). When an email guard table is
/// configured (hash key `email`), `put_new` writes the guard item and the
/// player in one transaction so two players can never claim the same email.
#[derive(Debug, Clone)]
pub struct DynamoPlayerTable {
    client: Client,
    table_name: String,
    email_guard_table: Option<String>,
}

impl DynamoPlayerTable {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            email_guard_table: None,
        }
    }

    pub fn with_email_guard(mut self, guard_table: impl Into<String>) -> Self {
        self.email_guard_table = Some(guard_table.into());
        self
    }

    /// Build a client from the AWS default provider chain, overridden by
    /// whatever `config` sets (region, endpoint).
    pub async fn connect(config: &TableConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        info!(
            table = %config.table_name,
            email_guard = ?config.email_guard_table,
            "initialized DynamoDB player table"
        );

        let table = Self::new(Client::new(&sdk_config), config.table_name.clone());
        match &config.email_guard_table {
            Some(guard) => table.with_email_guard(guard.clone()),
            None => table,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn put_guarded(&self, guard_table: &str, player: &Player) -> Result<(), TableError> {
        let guard = Put::builder()
            .table_name(guard_table)
            .item(EMAIL_ATTRIBUTE, AttributeValue::S(player.email().to_string()))
            .item("player_id", AttributeValue::S(player.id().to_string()))
            .condition_expression("attribute_not_exists(#email)")
            .expression_attribute_names("#email", EMAIL_ATTRIBUTE)
            .build()
            .map_err(|e| TableError::Backend(format!("guard put: {e}")))?;

        let record = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(player_to_item(player)?))
            .build()
            .map_err(|e| TableError::Backend(format!("player put: {e}")))?;

        self.client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(guard).build())
            .transact_items(TransactWriteItem::builder().put(record).build())
            .send()
            .await
            .map_err(map_transact_error)?;

        Ok(())
    }
}

#[async_trait]
impl PlayerTable for DynamoPlayerTable {
    #[instrument(
        skip(self, player),
        fields(table = %self.table_name, player_id = %player.id()),
        err
    )]
    async fn put(&self, player: &Player) -> Result<(), TableError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(player_to_item(player)?))
            .send()
            .await
            .map_err(|e| map_sdk_error("put_item", e))?;
        Ok(())
    }

    #[instrument(
        skip(self, player),
        fields(table = %self.table_name, player_id = %player.id()),
        err
    )]
    async fn put_new(&self, player: &Player) -> Result<(), TableError> {
        match &self.email_guard_table {
            Some(guard_table) => self.put_guarded(guard_table, player).await,
            None => self.put(player).await,
        }
    }

    #[instrument(skip(self, value), fields(table = %self.table_name, player_id = %id), err)]
    async fn update_set(
        &self,
        id: PlayerId,
        attribute: &str,
        value: JsonValue,
    ) -> Result<Player, TableError> {
        let output = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(ID_ATTRIBUTE, AttributeValue::S(id.to_string()))
            .update_expression("SET #attr = :value")
            .condition_expression("attribute_exists(#id)")
            .expression_attribute_names("#attr", attribute)
            .expression_attribute_names("#id", ID_ATTRIBUTE)
            .expression_attribute_values(":value", json_to_attribute(&value))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| map_update_error(id, e))?;

        let item = output.attributes.ok_or_else(|| {
            TableError::Malformed("update_item returned no attributes".to_string())
        })?;
        item_to_player(item)
    }

    #[instrument(skip(self), fields(table = %self.table_name), err)]
    async fn scan_all(&self) -> Result<Vec<Player>, TableError> {
        let mut players = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| map_sdk_error("scan", e))?;

            for item in output.items.unwrap_or_default() {
                players.push(item_to_player(item)?);
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        debug!(count = players.len(), "scanned player table");
        Ok(players)
    }

    #[instrument(skip(self), fields(table = %self.table_name), err)]
    async fn query_index(
        &self,
        index: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<Player>, TableError> {
        let mut players = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.table_name)
                .index_name(index)
                .key_condition_expression("#key = :value")
                .expression_attribute_names("#key", key)
                .expression_attribute_values(":value", AttributeValue::S(value.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| map_sdk_error("query", e))?;

            for item in output.items.unwrap_or_default() {
                players.push(item_to_player(item)?);
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        debug!(count = players.len(), "queried player index");
        Ok(players)
    }
}

fn map_sdk_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> TableError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_owned);
    let message = format!("{operation}: {}", DisplayErrorContext(&err));
    match code.as_deref() {
        Some("ConditionalCheckFailedException") => TableError::ConditionFailed(message),
        Some(
            "ProvisionedThroughputExceededException"
            | "ThrottlingException"
            | "RequestLimitExceeded",
        ) => TableError::Throttled(message),
        _ => TableError::Backend(message),
    }
}

/// The player row is conditioned on `attribute_exists(id)`, so a failed
/// condition means the row is missing.
fn map_update_error<R>(id: PlayerId, err: SdkError<UpdateItemError, R>) -> TableError
where
    R: std::fmt::Debug,
{
    match map_sdk_error("update_item", err) {
        TableError::ConditionFailed(_) => TableError::NotFound(id.to_string()),
        other => other,
    }
}

/// A cancelled transaction only means the email is taken when one of its
/// items failed its condition. Cancellations for any other reason are
/// storage failures.
fn map_transact_error<R>(err: SdkError<TransactWriteItemsError, R>) -> TableError
where
    R: std::fmt::Debug,
{
    let reasons: Option<Vec<String>> = match err.as_service_error() {
        Some(TransactWriteItemsError::TransactionCanceledException(cancelled)) => Some(
            cancelled
                .cancellation_reasons()
                .iter()
                .filter_map(|reason| reason.code())
                .filter(|code| *code != "None")
                .map(str::to_owned)
                .collect(),
        ),
        _ => None,
    };
    let Some(reasons) = reasons else {
        return map_sdk_error("transact_write_items", err);
    };

    let message = format!(
        "transact_write_items cancelled [{}]: {}",
        reasons.join(", "),
        DisplayErrorContext(&err)
    );
    let any = |wanted: &[&str]| reasons.iter().any(|code| wanted.contains(&code.as_str()));
    if any(&["ConditionalCheckFailed"]) {
        TableError::ConditionFailed(message)
    } else if any(&["ThrottlingError", "ProvisionedThroughputExceeded"]) {
        TableError::Throttled(message)
    } else {
        TableError::Backend(message)
    }
}

fn player_to_item(player: &Player) -> Result<Item, TableError> {
    match serde_json::to_value(player) {
        Ok(JsonValue::Object(fields)) => Ok(fields
            .iter()
            .map(|(name, value)| (name.clone(), json_to_attribute(value)))
            .collect()),
        Ok(other) => Err(TableError::Malformed(format!(
            "player encoded as non-object: {other}"
        ))),
        Err(e) => Err(TableError::Malformed(format!("player encode failed: {e}"))),
    }
}

fn item_to_player(item: Item) -> Result<Player, TableError> {
    let mut fields = Map::new();
    for (name, value) in item {
        fields.insert(name, attribute_to_json(value)?);
    }
    serde_json::from_value(JsonValue::Object(fields))
        .map_err(|e| TableError::Malformed(format!("player decode failed: {e}")))
}

fn json_to_attribute(value: &JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null(true),
        JsonValue::Bool(b) => AttributeValue::Bool(*b),
        JsonValue::Number(n) => AttributeValue::N(n.to_string()),
        JsonValue::String(s) => AttributeValue::S(s.clone()),
        JsonValue::Array(values) => {
            AttributeValue::L(values.iter().map(json_to_attribute).collect())
        }
        JsonValue::Object(fields) => AttributeValue::M(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), json_to_attribute(v)))
                .collect(),
        ),
    }
}

fn attribute_to_json(value: AttributeValue) -> Result<JsonValue, TableError> {
    Ok(match value {
        AttributeValue::Null(_) => JsonValue::Null,
        AttributeValue::Bool(b) => JsonValue::Bool(b),
        AttributeValue::N(n) => JsonValue::Number(parse_number(&n)?),
        AttributeValue::S(s) => JsonValue::String(s),
        AttributeValue::Ss(values) => {
            JsonValue::Array(values.into_iter().map(JsonValue::String).collect())
        }
        AttributeValue::Ns(values) => JsonValue::Array(
            values
                .iter()
                .map(|n| parse_number(n).map(JsonValue::Number))
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::L(values) => JsonValue::Array(
            values
                .into_iter()
                .map(attribute_to_json)
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::M(fields) => {
            let mut map = Map::new();
            for (k, v) in fields {
                map.insert(k, attribute_to_json(v)?);
            }
            JsonValue::Object(map)
        }
        other => {
            return Err(TableError::Malformed(format!(
                "unsupported attribute value: {other:?}"
            )));
        }
    })
}

fn parse_number(raw: &str) -> Result<Number, TableError> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Number::from(i));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| TableError::Malformed(format!("invalid number attribute '{raw}'")))
}
