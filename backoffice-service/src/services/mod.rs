pub mod database;
pub mod invoicing;
pub mod jwt;
pub mod ledger;
pub mod metrics;
pub mod stats;
pub mod storage;

pub use database::MongoDb;
pub use invoicing::{InvoiceService, LineRequest, NewInvoice};
pub use jwt::{AccessTokenClaims, JwtService};
pub use ledger::{BalanceSummary, CustomerLedger};
pub use metrics::{get_metrics, init_metrics};
pub use stats::StatsService;
pub use storage::{blob_key, delete_blob_detached, LocalStorage, Storage};
