//! Named business-code scopes used by entity-creation flows.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tablepos_core::RequestContext;

use super::calendar::BusinessCalendar;
use super::generator::{
    DEFAULT_DAILY_WIDTH, DEFAULT_INCR_WIDTH, DailySequence, IncrSequence, SequenceError,
    SequenceGenerator,
};
use super::scope::SequenceScope;
use super::store::SequenceStore;

/// Kinds of entities that receive a minted code on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessCode {
    Department,
    Role,
    TaxFee,
    User,
}

impl BusinessCode {
    pub const ALL: [BusinessCode; 4] = [
        BusinessCode::Department,
        BusinessCode::Role,
        BusinessCode::TaxFee,
        BusinessCode::User,
    ];

    /// Counter scope shared by every process instance.
    pub fn scope_key(self) -> &'static str {
        match self {
            BusinessCode::Department => "backend_department_seq",
            BusinessCode::Role => "backend_role_seq",
            BusinessCode::TaxFee => "backend_tax_fee_seq",
            BusinessCode::User => "backend_user_seq",
        }
    }

    /// User codes restart every business day; the rest never reset.
    pub fn is_daily(self) -> bool {
        matches!(self, BusinessCode::User)
    }
}

/// Zero-padding widths for minted codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeWidths {
    pub incr: usize,
    pub daily: usize,
}

impl Default for CodeWidths {
    fn default() -> Self {
        Self {
            incr: DEFAULT_INCR_WIDTH,
            daily: DEFAULT_DAILY_WIDTH,
        }
    }
}

/// Hands out one generator per business-code kind over a shared store.
#[derive(Clone)]
pub struct CodeMinter {
    store: Arc<dyn SequenceStore>,
    calendar: Arc<dyn BusinessCalendar>,
    widths: CodeWidths,
    prefixes: HashMap<BusinessCode, String>,
}

impl CodeMinter {
    pub fn new(store: Arc<dyn SequenceStore>, calendar: Arc<dyn BusinessCalendar>) -> Self {
        Self {
            store,
            calendar,
            widths: CodeWidths::default(),
            prefixes: HashMap::new(),
        }
    }

    pub fn with_widths(mut self, widths: CodeWidths) -> Self {
        self.widths = widths;
        self
    }

    /// Prefix for an incremental kind's codes (`D` gives `D000001`).
    ///
    /// Daily codes already lead with the business date and ignore this.
    pub fn with_prefix(mut self, kind: BusinessCode, prefix: impl Into<String>) -> Self {
        self.prefixes.insert(kind, prefix.into());
        self
    }

    pub fn generator(&self, kind: BusinessCode) -> Box<dyn SequenceGenerator> {
        let scope = SequenceScope::from_static(kind.scope_key());

        if kind.is_daily() {
            Box::new(
                DailySequence::new(self.store.clone(), self.calendar.clone(), scope)
                    .with_width(self.widths.daily),
            )
        } else {
            let prefix = self.prefixes.get(&kind).cloned().unwrap_or_default();
            Box::new(
                IncrSequence::new(self.store.clone(), scope)
                    .with_width(self.widths.incr)
                    .with_prefix(prefix),
            )
        }
    }

    pub async fn mint(
        &self,
        kind: BusinessCode,
        ctx: &RequestContext,
    ) -> Result<String, SequenceError> {
        self.generator(kind).next(ctx).await
    }
}

impl core::fmt::Debug for CodeMinter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CodeMinter")
            .field("widths", &self.widths)
            .field("prefixes", &self.prefixes)
            .finish_non_exhaustive()
    }
}

/// Mint a code, then persist the entity that carries it.
///
/// `persist` only runs once a code exists; a mint failure is returned as-is and
/// nothing is written.
pub async fn mint_then_persist<G, F, Fut, T, E>(
    generator: &G,
    ctx: &RequestContext,
    persist: F,
) -> Result<T, E>
where
    G: SequenceGenerator + ?Sized,
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<SequenceError>,
{
    let code = generator.next(ctx).await?;
    persist(code).await
}
