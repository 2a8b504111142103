//! The `Ledger` ties the session registry, the column bindings and the grid store together.
//! This is what a chat front end talks to: it submits fragments as they arrive, relays the
//! operator's edits, and posts once the operator confirms.

use crate::api::{self, GridStore, Mode};
use crate::classify::Classifier;
use crate::error::{ErrorType, IntoResult, Result};
use crate::model::{PostBatch, PostMode, PostResult, RawFragment};
use crate::post::{LedgerPoster, PostSettings, PostTarget};
use crate::retry::ProgressHook;
use crate::routing::{ColumnBindingStore, FxRateProvider};
use crate::session::{
    spawn_sweeper, Edit, EditField, Session, SessionKey, SessionRegistry, SessionSettings,
    SessionState,
};
use crate::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Sessions plus everything needed to post them.
pub struct Ledger {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn GridStore>,
    bindings: Arc<dyn ColumnBindingStore>,
    rates: Option<Arc<dyn FxRateProvider>>,
    settings: PostSettings,
    hook: Option<ProgressHook>,
}

impl Ledger {
    pub fn new(
        classifier: Classifier,
        session_settings: SessionSettings,
        store: Arc<dyn GridStore>,
        bindings: Arc<dyn ColumnBindingStore>,
        settings: PostSettings,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new(classifier, session_settings)),
            store,
            bindings,
            rates: None,
            settings,
            hook: None,
        }
    }

    /// A ledger built from the configuration: the database provides bindings and FX rates and
    /// `mode` picks the grid store.
    pub async fn from_config(config: &Config, mode: Mode) -> Result<Self> {
        let store = api::grid_store(config, mode)
            .await
            .pub_result(ErrorType::Config)?;
        Ok(Self::with_store(config, store))
    }

    /// Like `from_config` with a given grid store.
    pub fn with_store(config: &Config, store: Arc<dyn GridStore>) -> Self {
        let db = Arc::new(config.db().clone());
        Self::new(
            Classifier::new(config.classifier_settings().clone()),
            config.session_settings().clone(),
            store,
            db.clone(),
            config.post_settings().clone(),
        )
        .with_rates(db)
    }

    /// Enables profit computation in Add mode.
    pub fn with_rates(mut self, rates: Arc<dyn FxRateProvider>) -> Self {
        self.rates = Some(rates);
        self
    }

    /// Receives a notice before every retried grid call.
    pub fn with_hook(mut self, hook: ProgressHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Evicts idle sessions every `period` until the task is aborted.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        spawn_sweeper(self.registry.clone(), period)
    }

    pub async fn start(&self, key: &SessionKey, mode: PostMode) -> Result<Session> {
        self.registry.start(key, mode).await
    }

    pub async fn submit(&self, user_id: i64, fragment: &RawFragment) -> Result<SessionState> {
        self.registry.submit(user_id, fragment).await
    }

    pub async fn add_row(&self, key: &SessionKey) -> Result<usize> {
        self.registry.add_row(key).await
    }

    pub async fn remove_row(&self, key: &SessionKey, row: usize) -> Result<()> {
        self.registry.remove_row(key, row).await
    }

    pub async fn set_mode(&self, key: &SessionKey, mode: PostMode) -> Result<()> {
        self.registry.set_mode(key, mode).await
    }

    pub async fn begin_edit(&self, key: &SessionKey, row: usize, field: EditField) -> Result<()> {
        self.registry.begin_edit(key, row, field).await
    }

    pub async fn cancel_edit(&self, key: &SessionKey) -> Result<()> {
        self.registry.cancel_edit(key).await
    }

    pub async fn edit(&self, key: &SessionKey, row: usize, edit: Edit) -> Result<()> {
        self.registry.edit(key, row, edit).await
    }

    pub async fn snapshot(&self, key: &SessionKey) -> Option<Session> {
        self.registry.snapshot(key).await
    }

    pub async fn cancel(&self, key: &SessionKey) -> Result<()> {
        self.registry.cancel(key).await
    }

    pub async fn confirm(&self, key: &SessionKey) -> Result<PostBatch> {
        self.registry.confirm(key).await
    }

    /// Posts a confirmed session's `batch` to `target` and discards the session. The session
    /// cannot be cancelled while this runs. Failures of individual values are reported in the
    /// `PostResult`; `Err` means the session was not in a state that allows posting.
    pub async fn post(
        &self,
        key: &SessionKey,
        batch: &PostBatch,
        target: &PostTarget,
    ) -> Result<PostResult> {
        self.registry.begin_posting(key).await?;
        let mut poster = LedgerPoster::new(
            self.store.as_ref(),
            self.bindings.as_ref(),
            self.settings.clone(),
        );
        if let Some(rates) = &self.rates {
            poster = poster.with_rates(rates.as_ref());
        }
        if let Some(hook) = &self.hook {
            poster = poster.with_hook(hook.clone());
        }
        let result = poster.post(batch, target).await;
        self.registry.finish_posting(key, result.status()).await?;
        info!("Session {key}: {}", result.status());
        Ok(result)
    }

    /// `confirm` followed by `post`.
    pub async fn confirm_and_post(
        &self,
        key: &SessionKey,
        target: &PostTarget,
    ) -> Result<PostResult> {
        let batch = self.confirm(key).await?;
        self.post(key, &batch, target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TestGrid;
    use crate::error::StoreError;
    use crate::model::{ColumnSpan, RowBounds, Slot};
    use crate::session::SubmitOutcome;
    use crate::test::{MemoryBindings, TestEnv};
    use rust_decimal::Decimal;

    const SHEET: &str = "Ledger";

    fn target() -> PostTarget {
        PostTarget {
            sheet: SHEET.to_string(),
            span: ColumnSpan::new("B", "K").unwrap(),
            bounds: RowBounds::new(5, 20).unwrap(),
            profit_column: None,
        }
    }

    fn ledger(grid: Arc<TestGrid>) -> Ledger {
        let mut b = MemoryBindings::default();
        b.column("BTC", "C");
        b.column("XMR2", "F");
        b.column("SBER", "H");
        b.bucket("RUB", "J", "RUB", "Cash RUB");
        let settings = PostSettings {
            retry_delay_ms: 1,
            ..PostSettings::default()
        };
        Ledger::new(
            Classifier::default(),
            SessionSettings::default(),
            grid,
            Arc::new(b),
            settings,
        )
    }

    fn fragment(text: &str, id: &str) -> RawFragment {
        RawFragment::new(text, id, 1_700_000_000, "s1")
    }

    #[tokio::test]
    async fn test_submit_confirm_post() {
        let grid = Arc::new(TestGrid::new());
        let ledger = ledger(grid.clone());
        let key = SessionKey::new(7, "s1");

        ledger.submit(7, &fragment("0.008", "m1")).await.unwrap();
        ledger.submit(7, &fragment("5000", "m2")).await.unwrap();
        let state = ledger.submit(7, &fragment("5000", "m2")).await.unwrap();
        assert_eq!(state.outcome, SubmitOutcome::DuplicateFragment);

        let result = ledger.confirm_and_post(&key, &target()).await.unwrap();
        assert!(result.failed.is_empty(), "{}", result.summary());
        assert_eq!(grid.value(SHEET, "C5").as_deref(), Some("1.008"));
        assert_eq!(grid.value(SHEET, "J5").as_deref(), Some("5000"));
        assert!(ledger.snapshot(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_wallet_edit_before_post() {
        let grid = Arc::new(TestGrid::new());
        let ledger = ledger(grid.clone());
        let key = SessionKey::new(7, "s1");
        ledger.start(&key, PostMode::Rate).await.unwrap();
        ledger.submit(7, &fragment("0.5", "m1")).await.unwrap();
        ledger
            .edit(
                &key,
                0,
                Edit::Currency {
                    slot: Slot::Crypto,
                    currency: "XMR".to_string(),
                    wallet: None,
                },
            )
            .await
            .unwrap();

        let e = ledger.confirm(&key).await.unwrap_err();
        assert_eq!(e.error_type(), ErrorType::Validation);

        ledger
            .edit(&key, 0, Edit::WalletNumber { wallet: 2 })
            .await
            .unwrap();
        let result = ledger.confirm_and_post(&key, &target()).await.unwrap();
        assert_eq!(result.written.len(), 1);
        assert_eq!(result.written[0].cell.to_string(), "F5");
        assert_eq!(result.written[0].amount, Decimal::new(5, 1));
    }

    #[tokio::test]
    async fn test_post_requires_confirmation() {
        let grid = Arc::new(TestGrid::new());
        let ledger = ledger(grid.clone());
        let key = SessionKey::new(7, "s1");
        ledger.submit(7, &fragment("0.008", "m1")).await.unwrap();
        let batch = PostBatch::new(Vec::new(), PostMode::Add);
        let e = ledger.post(&key, &batch, &target()).await.unwrap_err();
        assert_eq!(e.error_type(), ErrorType::SessionState);
        assert_eq!(grid.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_post_discards_session() {
        let grid = Arc::new(TestGrid::new());
        let ledger = ledger(grid.clone());
        let key = SessionKey::new(7, "s1");
        grid.fail_next_writes(1, StoreError::fatal("403 Forbidden"));
        ledger.submit(7, &fragment("0.008", "m1")).await.unwrap();
        let result = ledger.confirm_and_post(&key, &target()).await.unwrap();
        assert!(!result.success());
        assert!(ledger.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_overflowing_post_still_ends_the_session() {
        let grid = Arc::new(TestGrid::new());
        let ledger = ledger(grid.clone());
        let key = SessionKey::new(7, "s1");
        let huge = "50000000000000000000000000000.5";
        ledger.submit(7, &fragment(huge, "m1")).await.unwrap();
        ledger.add_row(&key).await.unwrap();
        ledger.submit(7, &fragment(huge, "m2")).await.unwrap();

        let result = ledger.confirm_and_post(&key, &target()).await.unwrap();
        assert!(!result.success());
        assert_eq!(result.failed[0].reason.error_type(), ErrorType::Validation);
        assert_eq!(grid.write_calls(), 0);
        assert!(ledger.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_from_config_uses_database_bindings() {
        let env = TestEnv::new().await;
        let config = env.config();
        config.db().set_column("BTC", "D").await.unwrap();
        let grid = Arc::new(TestGrid::new());
        let ledger = Ledger::with_store(&config, grid.clone());
        let key = SessionKey::new(1, "s1");
        ledger.submit(1, &fragment("0.008", "m1")).await.unwrap();
        let result = ledger.confirm_and_post(&key, &target()).await.unwrap();
        assert_eq!(result.written[0].cell.to_string(), "D5");
        // Crypto only: the profit is the negated total, surcharge included
        assert_eq!(result.profit, Some(-1));
    }
}
