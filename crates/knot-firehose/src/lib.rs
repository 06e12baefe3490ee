//! Firehose ingestion: sharded jetstream subscriptions that admit new
//! members and collaborators, seed public keys, and compile pipeline
//! triggers, fanning every mutation out through the RBAC enforcer and the
//! shared change oplog.

mod error;
mod ingester;
mod messages;
mod rebalance;
mod router;
mod sharding;
mod trigger;
mod worker;

pub use error::{FirehoseError, Result};
pub use ingester::Ingester;
pub use messages::{FirehoseMessage, FirehoseRecord};
pub use rebalance::{diff_from_current, RebalancePlan};
pub use router::{KeyFetcher, MessageRouter, RepoLocator};
pub use sharding::{compute_targets, MAX_DIDS_PER_WORKER};
pub use trigger::{compile as compile_pipeline_trigger, PipelineTrigger, WorkflowFile};
