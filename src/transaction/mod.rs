// src/transaction/mod.rs

//! Install, remove and upgrade transactions
//!
//! Every transaction walks the same state machine:
//!
//! ```text
//! Init -> Expanded -> Prepared -> Committed
//! ```
//!
//! `expand` resolves what the transaction will actually do and fails on
//! unresolvable plans (missing dependencies, cycles, conflicts, broken
//! dependants). `prepare` does all fallible heavy lifting (downloads,
//! extraction, packaging) without touching the installed set. `commit` then
//! only copies staged files and rewrites install records, keeping the window
//! in which an interruption hurts as small as it can be. Calling a step out
//! of order is a programming error, not a user error, and panics.

mod add;
mod remove;
mod upgrade;

pub use add::AddTransaction;
pub use remove::RemoveTransaction;
pub use upgrade::UpgradeTransaction;

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::package::CopyOp;

/// Lifecycle phase of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Init,
    Expanded,
    Prepared,
    Committed,
}

/// Replay staged copy operations into a package's install directory
pub(crate) fn apply_copy_ops(install_dir: &Path, ops: &[CopyOp]) -> Result<()> {
    for op in ops {
        let dest = install_dir.join(&op.dest);
        if op.source.is_dir() {
            copy_tree(&op.source, &dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&op.source, &dest)?;
        }
    }
    Ok(())
}

fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}
