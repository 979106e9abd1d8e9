//! # Watchtower Oracle
//!
//! Periodic reporting engine of a trusted oracle node. For each report
//! category it waits for a new checkpoint block, checks that the block is
//! finalized on the consensus layer, computes the category's values at
//! exactly that block, and submits them once.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Supervisor                              │
//! │   ┌──────────────────────────┐   ┌──────────────────────────┐    │
//! │   │ balances loop (interval) │   │  prices loop (interval)  │    │
//! │   └────────────┬─────────────┘   └────────────┬─────────────┘    │
//! │                ▼                              ▼                  │
//! │   ┌──────────────────────────────────────────────────────────┐  │
//! │   │                      ReportTask::tick                     │  │
//! │   │  sync → trusted → enabled → scheduler → finality → flight │  │
//! │   └────────────────────────────┬─────────────────────────────┘  │
//! │                                ▼ spawn                           │
//! │   ┌──────────────────────────────────────────────────────────┐  │
//! │   │  ReportSource::compute → ledger → SubmissionExecutor      │  │
//! │   │  (BalancesReport / PriceReport)                           │  │
//! │   └──────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Role |
//! |--------|------|
//! | `scheduler` | checkpoint selection (`reportable > recorded`) |
//! | `finality` | block time → slot/epoch, finalized-epoch gate |
//! | `ledger` | on-chain submission flags (idempotency) |
//! | `bonding` | user share of a validator balance |
//! | `balances` | concurrent, batched network balance aggregation |
//! | `price` | tick and reserve TWAP price sources |
//! | `executor` | gas, fee ceiling, send, inclusion |
//! | `single_flight` | one report in flight per category |
//! | `report` | per-category pipeline |
//! | `supervisor` | periodic loops and shutdown |
//!
//! The engine never installs a tracing subscriber; that is left to the
//! embedding binary.

pub mod balances;
pub mod bonding;
pub mod error;
pub mod executor;
pub mod finality;
pub mod ledger;
pub mod price;
pub mod report;
pub mod scheduler;
pub mod single_flight;
pub mod supervisor;

pub use balances::{
    BalanceAggregator, EstimatorError, NoSmoothingPool, SmoothingEstimateRequest,
    SmoothingPoolEstimator,
};
pub use bonding::BondingCurve;
pub use error::OracleError;
pub use executor::{FeeLimits, SubmissionExecutor, SubmissionOutcome};
pub use ledger::{LedgerStatus, SubmissionLedger};
pub use price::{PriceSource, ReserveTwapSource, TickTwapSource};
pub use report::{
    BalancesReport, Checkpoint, PriceReport, ReportOutcome, ReportSource, ReportTask, TickOutcome,
};
pub use scheduler::{CheckpointDecision, CheckpointScheduler};
pub use single_flight::SingleFlight;
pub use supervisor::{Supervisor, SupervisorHandle};

const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<ReportTask>();
        assert_send_sync::<BalanceAggregator>();
    }
    let _ = check;
};
