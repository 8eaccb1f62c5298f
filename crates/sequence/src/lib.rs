//! Business-code sequences.
//!
//! ## Components
//!
//! - `SequenceScope` / `PeriodKey` / `SequenceState`: counter identity and state
//! - `SequenceStore`: atomic advance-and-read primitive (in-memory or durable)
//! - `BusinessCalendar`: maps "now" to a business date (rollover aware)
//! - `IncrSequence` / `DailySequence`: formatted code generators
//! - `CodeMinter`: named scopes for department/role/tax-fee/user codes

pub mod calendar;
pub mod codes;
pub mod generator;
pub mod scope;
pub mod store;

pub use calendar::{BusinessCalendar, FixedCalendar, RolloverCalendar};
pub use codes::{BusinessCode, CodeMinter, CodeWidths, mint_then_persist};
pub use generator::{DailySequence, IncrSequence, SequenceError, SequenceGenerator};
pub use scope::{PeriodKey, SequenceScope, SequenceState};
pub use store::{InMemorySequenceStore, SequenceStore, SequenceStoreError};
