use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::StrategyStore;
use crate::config::ConfigSynchronizer;
use crate::gateway::{AccountGateway, GatewayError};
use crate::notifications::{request_failed, AlertType, NotificationManager};
use crate::types::{
    has_changed, is_custom_account, is_standard_field, StrategyRecord, ACCOUNT_AUTO, ACCOUNT_CREDIT,
    ACCOUNT_NORMAL,
};

/// Currency precision accepted for strategy amounts (fen).
const AMOUNT_MAX_SCALE: u32 = 2;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("strategy {0} not found")]
    UnknownStrategy(String),

    #[error("strategy {0} is not being edited")]
    NotEditing(String),

    #[error("strategy id must not be empty")]
    EmptyId,

    #[error("strategy {0} already exists")]
    DuplicateId(String),

    #[error("custom field {0} not found")]
    UnknownField(FieldId),

    #[error("invalid amount '{0}': expected a non-negative number with at most 2 decimals")]
    InvalidAmount(String),

    #[error("'{0}' is a standard strategy field and cannot be used as a custom field")]
    ReservedField(String),

    #[error("strategy load superseded by a newer request")]
    StaleLoad,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Stable identity of a custom-field draft within an edit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FieldId(Uuid);

impl FieldId {
    fn new() -> Self {
        FieldId(Uuid::new_v4())
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed choice of the account selector; `Custom` enables the free-text name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccountChoice {
    Auto,
    Normal,
    Credit,
    Custom,
}

impl AccountChoice {
    /// How a stored account value is presented when the card opens for editing.
    pub fn classify(account: &str) -> Self {
        match account {
            ACCOUNT_AUTO => AccountChoice::Auto,
            ACCOUNT_NORMAL => AccountChoice::Normal,
            ACCOUNT_CREDIT => AccountChoice::Credit,
            _ => AccountChoice::Custom,
        }
    }

    pub fn token(&self) -> Option<&'static str> {
        match self {
            AccountChoice::Auto => Some(ACCOUNT_AUTO),
            AccountChoice::Normal => Some(ACCOUNT_NORMAL),
            AccountChoice::Credit => Some(ACCOUNT_CREDIT),
            AccountChoice::Custom => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Some(AccountChoice::Auto),
            "normal" => Some(AccountChoice::Normal),
            "credit" => Some(AccountChoice::Credit),
            "custom" => Some(AccountChoice::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomFieldDraft {
    pub id: FieldId,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CardMode {
    Display,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing differed from the stored record; no request was made.
    Unchanged,
    Saved,
}

/// Draft values of one strategy card in edit mode.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    pub enabled: bool,
    pub amount: String,
    pub amtkey: String,
    account_choice: AccountChoice,
    custom_account: String,
    custom_fields: Vec<CustomFieldDraft>,
}

impl EditSession {
    pub fn from_record(record: &StrategyRecord) -> Self {
        let account_choice = AccountChoice::classify(&record.account);
        let custom_account = if is_custom_account(&record.account) {
            record.account.clone()
        } else {
            String::new()
        };

        Self {
            enabled: record.enabled,
            amount: record.amount_text(),
            amtkey: record.amtkey_str().to_string(),
            account_choice,
            custom_account,
            custom_fields: record
                .custom
                .iter()
                .map(|(key, value)| CustomFieldDraft {
                    id: FieldId::new(),
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }

    pub fn account_choice(&self) -> AccountChoice {
        self.account_choice
    }

    pub fn custom_account(&self) -> &str {
        &self.custom_account
    }

    /// Leaving `Custom` clears the free-text name.
    pub fn select_account(&mut self, choice: AccountChoice) {
        self.account_choice = choice;
        if choice != AccountChoice::Custom {
            self.custom_account.clear();
        }
    }

    /// The free-text name only accepts input while `Custom` is selected.
    pub fn set_custom_account(&mut self, name: &str) -> bool {
        if self.account_choice != AccountChoice::Custom {
            return false;
        }
        self.custom_account = name.to_string();
        true
    }

    pub fn resolved_account(&self) -> String {
        match self.account_choice.token() {
            Some(token) => token.to_string(),
            None => self.custom_account.trim().to_string(),
        }
    }

    pub fn custom_fields(&self) -> &[CustomFieldDraft] {
        &self.custom_fields
    }

    pub fn add_custom_field(&mut self) -> FieldId {
        let id = FieldId::new();
        self.custom_fields.push(CustomFieldDraft {
            id,
            key: String::new(),
            value: String::new(),
        });
        id
    }

    pub fn remove_custom_field(&mut self, id: FieldId) -> bool {
        let before = self.custom_fields.len();
        self.custom_fields.retain(|field| field.id != id);
        self.custom_fields.len() != before
    }

    pub fn set_custom_field(&mut self, id: FieldId, key: &str, value: &str) -> bool {
        match self.custom_fields.iter_mut().find(|field| field.id == id) {
            Some(field) => {
                field.key = key.to_string();
                field.value = value.to_string();
                true
            }
            None => false,
        }
    }

    /// Reduces the drafts into the record that would be stored under `id`.
    ///
    /// Drafts with a blank key or value are dropped; a later draft wins over an
    /// earlier one with the same key.
    pub fn build_candidate(&self, id: &str) -> Result<StrategyRecord, EditorError> {
        let amount = parse_amount(&self.amount)?;

        let mut custom = BTreeMap::new();
        for field in &self.custom_fields {
            let key = field.key.trim();
            let value = field.value.trim();
            if key.is_empty() || value.is_empty() {
                continue;
            }
            if is_standard_field(key) {
                return Err(EditorError::ReservedField(key.to_string()));
            }
            custom.insert(key.to_string(), value.to_string());
        }

        let amtkey = self.amtkey.trim();

        Ok(StrategyRecord {
            key: id.to_string(),
            enabled: self.enabled,
            amount,
            account: self.resolved_account(),
            amtkey: (!amtkey.is_empty()).then(|| amtkey.to_string()),
            custom,
        })
    }
}

pub fn parse_amount(text: &str) -> Result<Decimal, EditorError> {
    let invalid = || EditorError::InvalidAmount(text.to_string());
    let amount = Decimal::from_str(text.trim()).map_err(|_| invalid())?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(invalid());
    }
    if amount.normalize().scale() > AMOUNT_MAX_SCALE {
        return Err(invalid());
    }
    Ok(amount)
}

/// Issued by [`StrategyEditor::begin_load`]; a load result is applied only
/// with the ticket of the most recent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

/// Owns the strategy store and the per-card edit sessions.
pub struct StrategyEditor {
    store: StrategyStore,
    sessions: HashMap<String, EditSession>,
    /// Created locally and not yet persisted.
    pending: HashSet<String>,
    gateway: Arc<dyn AccountGateway>,
    synchronizer: Arc<ConfigSynchronizer>,
    notifications: NotificationManager,
    generation: u64,
}

impl StrategyEditor {
    pub fn new(
        gateway: Arc<dyn AccountGateway>,
        synchronizer: Arc<ConfigSynchronizer>,
        notifications: NotificationManager,
    ) -> Self {
        Self {
            store: StrategyStore::new(),
            sessions: HashMap::new(),
            pending: HashSet::new(),
            gateway,
            synchronizer,
            notifications,
            generation: 0,
        }
    }

    pub fn store(&self) -> &StrategyStore {
        &self.store
    }

    pub fn mode(&self, id: &str) -> Option<CardMode> {
        if !self.store.contains(id) {
            return None;
        }
        Some(if self.sessions.contains_key(id) {
            CardMode::Edit
        } else {
            CardMode::Display
        })
    }

    pub fn session(&self, id: &str) -> Option<&EditSession> {
        self.sessions.get(id)
    }

    pub fn session_mut(&mut self, id: &str) -> Result<&mut EditSession, EditorError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| EditorError::NotEditing(id.to_string()))
    }

    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        LoadTicket(self.generation)
    }

    /// Applies a `/iunstrs` result: the store is replaced wholesale and every
    /// open edit session is dropped. On failure nothing changes.
    pub async fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<BTreeMap<String, StrategyRecord>, GatewayError>,
    ) -> Result<usize, EditorError> {
        if ticket.0 != self.generation {
            debug!("Discarding strategy load {} (current {})", ticket.0, self.generation);
            return Err(EditorError::StaleLoad);
        }

        match result {
            Ok(strategies) => {
                self.store = StrategyStore::from_loaded(strategies);
                self.sessions.clear();
                self.pending.clear();
                info!("Loaded {} strategies", self.store.len());
                Ok(self.store.len())
            }
            Err(e) => {
                self.notifications.notify(request_failed("Loading strategies", &e)).await;
                Err(e.into())
            }
        }
    }

    pub async fn load_all(&mut self) -> Result<usize, EditorError> {
        let ticket = self.begin_load();
        let result = self.gateway.strategies().await;
        self.finish_load(ticket, result).await
    }

    /// Drops the store when the strategies view is left; in-flight loads become stale.
    pub fn discard(&mut self) {
        self.generation += 1;
        self.store = StrategyStore::new();
        self.sessions.clear();
        self.pending.clear();
    }

    /// Opens the card for editing. Already-open sessions are returned as they are.
    pub fn begin_edit(&mut self, id: &str) -> Result<&mut EditSession, EditorError> {
        let record = match self.store.get(id) {
            Some(record) => record,
            None => {
                debug!("Edit requested for unknown strategy {}", id);
                return Err(EditorError::UnknownStrategy(id.to_string()));
            }
        };

        Ok(self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| EditSession::from_record(record)))
    }

    pub fn cancel_edit(&mut self, id: &str) -> Result<(), EditorError> {
        if !self.store.contains(id) {
            return Err(EditorError::UnknownStrategy(id.to_string()));
        }
        self.sessions.remove(id);
        Ok(())
    }

    pub fn add_custom_field(&mut self, id: &str) -> Result<FieldId, EditorError> {
        Ok(self.session_mut(id)?.add_custom_field())
    }

    pub fn remove_custom_field(&mut self, id: &str, field: FieldId) -> Result<(), EditorError> {
        if self.session_mut(id)?.remove_custom_field(field) {
            Ok(())
        } else {
            Err(EditorError::UnknownField(field))
        }
    }

    /// Adds a strategy with default values and opens it for editing. Nothing
    /// is sent to the gateway until the first save.
    pub async fn create_new(&mut self, id: &str) -> Result<&mut EditSession, EditorError> {
        let id = id.trim();
        if id.is_empty() {
            self.notifications.notify(AlertType::EmptyStrategyId).await;
            return Err(EditorError::EmptyId);
        }
        if self.store.contains(id) {
            self.notifications
                .notify(AlertType::DuplicateStrategy { id: id.to_string() })
                .await;
            return Err(EditorError::DuplicateId(id.to_string()));
        }

        let record = StrategyRecord::new_default(id);
        let session = EditSession::from_record(&record);
        self.store.insert(id, record);
        self.pending.insert(id.to_string());
        info!("Created strategy {}", id);

        Ok(self.sessions.entry(id.to_string()).or_insert(session))
    }

    /// Commits the edit session of `id`.
    ///
    /// Unchanged drafts close the card without a request, unless the strategy
    /// was created by [`Self::create_new`] and never persisted. Otherwise the whole
    /// store is persisted; on failure the previous record is restored and the
    /// session stays open with the attempted values.
    pub async fn save(&mut self, id: &str) -> Result<SaveOutcome, EditorError> {
        let stored = self
            .store
            .get(id)
            .cloned()
            .ok_or_else(|| EditorError::UnknownStrategy(id.to_string()))?;
        let session = self
            .sessions
            .get(id)
            .ok_or_else(|| EditorError::NotEditing(id.to_string()))?;

        let candidate = match session.build_candidate(id) {
            Ok(candidate) => candidate,
            Err(e) => {
                self.notifications
                    .notify(AlertType::StrategyInvalid {
                        id: id.to_string(),
                        message: e.to_string(),
                    })
                    .await;
                return Err(e);
            }
        };

        if !self.pending.contains(id) && !has_changed(&stored, &candidate) {
            debug!("Strategy {} unchanged, closing editor", id);
            self.sessions.remove(id);
            return Ok(SaveOutcome::Unchanged);
        }

        self.store.insert(id, candidate);

        match self.synchronizer.persist_strategies(&self.store).await {
            Ok(()) => {
                self.sessions.remove(id);
                self.pending.remove(id);
                self.notifications
                    .notify(AlertType::StrategySaved { id: id.to_string() })
                    .await;
                Ok(SaveOutcome::Saved)
            }
            Err(e) => {
                self.store.insert(id, stored);
                self.notifications
                    .notify(AlertType::StrategySaveFailed {
                        id: id.to_string(),
                        message: e.to_string(),
                    })
                    .await;
                Err(e.into())
            }
        }
    }
}
