//! Per-domain aggregation of geographic evidence and the final decision.
//!
//! Workers fold events into a [`DomainTally`] per file, merge those partials
//! into the shared [`DomainLedger`], and once every file is done the
//! [`DomainScorer`] turns each tally into a [`ClassificationRecord`].

pub mod decision;
pub mod ledger;
pub mod tally;

pub use decision::{Classification, ClassificationRecord, DecisionRule, DomainScorer};
pub use ledger::{DomainLedger, LedgerSnapshot, PartialTallies};
pub use tally::DomainTally;
