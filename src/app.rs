use std::sync::Arc;

use axum::extract::FromRef;
use rand::rngs::StdRng;
use secrecy::{ExposeSecret, SecretString};

use crate::auth::{AccountService, InMemoryUserStore, PasswordConfig, PasswordHasher, TokenService, UserStore};
use crate::billing::{BillingStore, EntitlementsManager, InMemoryBillingStore, WebhookHandler};
use crate::chat::{ChatCleanup, ChatHub, ChatService, ChatStore, InMemoryChatStore};
use crate::circles::{CircleService, InMemoryCircleStore};
use crate::config::Config;
use crate::diary::{DiaryEntry, DiaryService};
use crate::expenses::{Expense, ExpenseService};
use crate::gacha::{GachaService, InMemoryGachaStore};
use crate::goods::{GoodsItem, GoodsService};
use crate::oplog::{InMemoryOperationLogStore, OperationLogger};
use crate::oshi::{Oshi, OshiDetacher, OshiService};
use crate::points::{CircleLedgerCleanup, CirclePointsService, InMemoryLedgerStore, LedgerStore, PointsService};
use crate::schedules::{Schedule, ScheduleService};
use crate::settlements::{InMemorySettlementStore, SettlementCleanup, SettlementService, SettlementStore};
use crate::store::{InMemoryRepository, Repository};

/// Shared state handed to every handler
///
/// All services sit behind `Arc`, so cloning the context per request is
/// cheap. Build one with [`AppContext::builder`].
#[derive(Clone)]
pub struct AppContext {
    pub tokens: Arc<TokenService>,
    pub oplog: Arc<OperationLogger>,
    pub entitlements: Arc<EntitlementsManager>,
    pub webhooks: Arc<WebhookHandler>,
    pub accounts: Arc<AccountService>,
    pub points: Arc<PointsService>,
    pub circles: Arc<CircleService>,
    pub circle_points: Arc<CirclePointsService>,
    pub oshi: Arc<OshiService>,
    pub diary: Arc<DiaryService>,
    pub expenses: Arc<ExpenseService>,
    pub goods: Arc<GoodsService>,
    pub schedules: Arc<ScheduleService>,
    pub chat: Arc<ChatService>,
    pub settlements: Arc<SettlementService>,
    pub gacha: Arc<GachaService>,
}

impl AppContext {
    pub fn builder(config: &Config) -> AppContextBuilder<'_> {
        AppContextBuilder::new(config)
    }
}

impl FromRef<AppContext> for Arc<TokenService> {
    fn from_ref(ctx: &AppContext) -> Self {
        ctx.tokens.clone()
    }
}

/// Wires the services together over in-memory stores
///
/// ```rust,ignore
/// let ctx = AppContext::builder(&config)
///     .with_password_config(PasswordConfig::fast())
///     .build();
/// ```
#[must_use = "builder does nothing until you call build()"]
pub struct AppContextBuilder<'a> {
    config: &'a Config,
    password: PasswordConfig,
    gacha_rng: Option<StdRng>,
    billing_store: Option<Arc<dyn BillingStore>>,
}

impl<'a> AppContextBuilder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            password: PasswordConfig::default(),
            gacha_rng: None,
            billing_store: None,
        }
    }

    /// Argon2 cost parameters; tests use [`PasswordConfig::fast`].
    pub fn with_password_config(mut self, password: PasswordConfig) -> Self {
        self.password = password;
        self
    }

    /// Seed the gacha for reproducible draws.
    pub fn with_gacha_rng(mut self, rng: StdRng) -> Self {
        self.gacha_rng = Some(rng);
        self
    }

    /// Share a billing store with the caller, e.g. to seed subscriptions.
    pub fn with_billing_store(mut self, store: Arc<dyn BillingStore>) -> Self {
        self.billing_store = Some(store);
        self
    }

    pub fn build(self) -> AppContext {
        let config = self.config;

        let oplog = Arc::new(OperationLogger::new(
            Arc::new(InMemoryOperationLogStore::new()),
            config.oplog.clone(),
        ));

        let plans = config.billing.plans();
        let billing_store: Arc<dyn BillingStore> = match self.billing_store {
            Some(store) => store,
            None => Arc::new(InMemoryBillingStore::new()),
        };
        let entitlements = Arc::new(EntitlementsManager::new(billing_store.clone(), plans.clone()));
        let webhooks = Arc::new(WebhookHandler::new(
            billing_store,
            SecretString::from(config.billing.webhook_secret.expose_secret().to_string()),
            config.billing.signature_tolerance_seconds,
            plans,
            oplog.clone(),
        ));

        let ledger: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
        let points = Arc::new(PointsService::new(
            ledger.clone(),
            config.points.clone(),
            oplog.clone(),
        ));

        let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
        let tokens = Arc::new(TokenService::new(&config.auth));
        let accounts = Arc::new(AccountService::new(
            users.clone(),
            PasswordHasher::new(self.password),
            tokens.clone(),
            points.clone(),
            entitlements.clone(),
            oplog.clone(),
        ));

        let hub = Arc::new(ChatHub::default());
        let chat_store: Arc<dyn ChatStore> = Arc::new(InMemoryChatStore::new());
        let settlement_store: Arc<dyn SettlementStore> = Arc::new(InMemorySettlementStore::new());
        let circles = Arc::new(
            CircleService::new(
                Arc::new(InMemoryCircleStore::new()),
                users,
                entitlements.clone(),
                oplog.clone(),
            )
            .with_cleanup(Arc::new(CircleLedgerCleanup::new(ledger.clone())))
            .with_cleanup(Arc::new(ChatCleanup::new(chat_store.clone(), hub.clone())))
            .with_cleanup(Arc::new(SettlementCleanup::new(settlement_store.clone()))),
        );
        let circle_points = Arc::new(CirclePointsService::new(ledger, circles.clone(), oplog.clone()));

        let oshi_repo: Arc<dyn Repository<Oshi>> = InMemoryRepository::shared();
        let diary_repo: Arc<dyn Repository<DiaryEntry>> = InMemoryRepository::shared();
        let expense_repo: Arc<dyn Repository<Expense>> = InMemoryRepository::shared();
        let goods_repo: Arc<dyn Repository<GoodsItem>> = InMemoryRepository::shared();
        let schedule_repo: Arc<dyn Repository<Schedule>> = InMemoryRepository::shared();

        let oshi = Arc::new(
            OshiService::new(oshi_repo.clone(), entitlements.clone(), oplog.clone())
                .with_references(Arc::new(OshiDetacher::new(diary_repo.clone())))
                .with_references(Arc::new(OshiDetacher::new(expense_repo.clone())))
                .with_references(Arc::new(OshiDetacher::new(goods_repo.clone())))
                .with_references(Arc::new(OshiDetacher::new(schedule_repo.clone()))),
        );
        let diary = Arc::new(DiaryService::new(
            diary_repo,
            oshi_repo.clone(),
            points.clone(),
            oplog.clone(),
        ));
        let expenses = Arc::new(ExpenseService::new(
            expense_repo,
            oshi_repo.clone(),
            goods_repo.clone(),
            entitlements.clone(),
            oplog.clone(),
        ));
        let goods = Arc::new(GoodsService::new(
            goods_repo,
            oshi_repo.clone(),
            expenses.clone(),
            oplog.clone(),
        ));
        let schedules = Arc::new(ScheduleService::new(schedule_repo, oshi_repo, oplog.clone()));

        let chat = Arc::new(ChatService::new(chat_store, hub, circles.clone(), oplog.clone()));
        let settlements = Arc::new(SettlementService::new(
            settlement_store,
            circles.clone(),
            oplog.clone(),
        ));

        let mut gacha = GachaService::new(
            Arc::new(InMemoryGachaStore::new()),
            points.clone(),
            entitlements.clone(),
            config.gacha.clone(),
            oplog.clone(),
        );
        if let Some(rng) = self.gacha_rng {
            gacha = gacha.with_rng(rng);
        }

        AppContext {
            tokens,
            oplog,
            entitlements,
            webhooks,
            accounts,
            points,
            circles,
            circle_points,
            oshi,
            diary,
            expenses,
            goods,
            schedules,
            chat,
            settlements,
            gacha: Arc::new(gacha),
        }
    }
}
