//! Transform hooks.
//!
//! Hooks run inside the remote engine. Here they are only source text plus a
//! declared contract (parameter count and return shape) that is checked
//! against the call the engine will make:
//!
//! | Slot     | Engine calls              | Must return          |
//! |----------|---------------------------|----------------------|
//! | `init`   | `init(sql, scanCursor)`   | a value (the ctx)    |
//! | `header` | `header(ctx, firstRow)`   | `[ctx, header]`      |
//! | `batch`  | `batch(ctx, rows)`        | `[ctx, rows]`        |
//! | `footer` | `footer(ctx, total)`      | a value              |
//! | `final`  | `final(ctx, allRows)`     | an array of rows     |
//!
//! A mismatch fails the query submission before anything is sent.

use std::fmt;

use crate::error::{ClientError, Result};
use crate::protocol::HookSources;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookSlot {
    Init,
    Header,
    Batch,
    Footer,
    Final,
}

impl HookSlot {
    /// Arguments the engine passes to this slot.
    pub fn arity(self) -> usize {
        2
    }

    fn accepts(self, shape: ReturnShape) -> bool {
        match self {
            HookSlot::Init | HookSlot::Footer => shape != ReturnShape::Nothing,
            HookSlot::Header | HookSlot::Batch => shape == ReturnShape::Pair,
            HookSlot::Final => shape == ReturnShape::Array,
        }
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            HookSlot::Init => "initFunc",
            HookSlot::Header => "headerFunc",
            HookSlot::Batch => "batchFunc",
            HookSlot::Footer => "footerFunc",
            HookSlot::Final => "finalFunc",
        }
    }
}

impl fmt::Display for HookSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// What a hook declares it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    Nothing,
    /// Any single value
    Value,
    /// A two-element tuple
    Pair,
    Array,
}

/// One hook: opaque source plus its declared contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    source: String,
    arity: usize,
    returns: ReturnShape,
}

impl Hook {
    pub fn new(source: impl Into<String>, arity: usize, returns: ReturnShape) -> Self {
        Self {
            source: source.into(),
            arity,
            returns,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn check(&self, slot: HookSlot) -> Result<()> {
        let fail = |reason: String| ClientError::HookValidation { hook: slot, reason };

        if self.source.trim().is_empty() {
            return Err(fail("source is empty".into()));
        }
        if self.arity > slot.arity() {
            return Err(fail(format!(
                "declares {} parameters, engine passes {}",
                self.arity,
                slot.arity()
            )));
        }
        if !slot.accepts(self.returns) {
            return Err(fail(format!("return shape {:?} is not accepted", self.returns)));
        }
        Ok(())
    }
}

/// The optional hook set of one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hooks {
    pub init: Option<Hook>,
    pub header: Option<Hook>,
    pub batch: Option<Hook>,
    pub footer: Option<Hook>,
    pub finalize: Option<Hook>,
}

impl Hooks {
    pub fn is_empty(&self) -> bool {
        self.slots().iter().all(|(_, hook)| hook.is_none())
    }

    fn slots(&self) -> [(HookSlot, Option<&Hook>); 5] {
        [
            (HookSlot::Init, self.init.as_ref()),
            (HookSlot::Header, self.header.as_ref()),
            (HookSlot::Batch, self.batch.as_ref()),
            (HookSlot::Footer, self.footer.as_ref()),
            (HookSlot::Final, self.finalize.as_ref()),
        ]
    }

    /// Check every supplied hook against its slot.
    pub fn validate(&self) -> Result<()> {
        self.slots()
            .into_iter()
            .filter_map(|(slot, hook)| hook.map(|h| (slot, h)))
            .try_for_each(|(slot, hook)| hook.check(slot))
    }

    /// Wire form, or `None` when no hook is set.
    pub fn to_sources(&self) -> Option<HookSources> {
        if self.is_empty() {
            return None;
        }
        let source = |hook: &Option<Hook>| hook.as_ref().map(|h| h.source.clone());
        Some(HookSources {
            init_func: source(&self.init),
            header_func: source(&self.header),
            batch_func: source(&self.batch),
            footer_func: source(&self.footer),
            final_func: source(&self.finalize),
        })
    }
}
