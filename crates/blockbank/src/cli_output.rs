//! Centralised helpers for CLI output: results as JSON on stdout, progress on stderr.

use crate::orchestrator::{Notice, NoticeKind, Phase};
use crate::slippage::SlippageTolerance;
use eyre::Context as _;
use serde::Serialize;
use std::io::{BufRead as _, IsTerminal as _, Write as _};

fn stderr_write(s: &str) {
    let mut stderr = std::io::stderr().lock();
    if stderr.write_all(s.as_bytes()).is_err() {
        return;
    }
    let _flush = stderr.flush();
}

fn stderr_writeln(s: &str) {
    stderr_write(&format!("{s}\n"));
}

/// One JSON document per line on stdout.
pub fn print_json<T: Serialize + ?Sized>(v: &T) -> eyre::Result<()> {
    let s = serde_json::to_string(v).context("serialize output")?;
    writeln!(std::io::stdout().lock(), "{s}").context("write stdout")
}

pub fn print_json_pretty<T: Serialize + ?Sized>(v: &T) -> eyre::Result<()> {
    let s = serde_json::to_string_pretty(v).context("serialize output")?;
    writeln!(std::io::stdout().lock(), "{s}").context("write stdout")
}

pub fn print_phase(phase: Phase) {
    let line = match phase {
        Phase::Idle => "idle".to_owned(),
        Phase::Approving => "approving: confirm the approval in your wallet".to_owned(),
        Phase::ApproveConfirming { tx_hash } => format!("approval submitted {tx_hash:#x}; waiting for confirmation"),
        Phase::Swapping => "swapping: confirm the swap in your wallet".to_owned(),
        Phase::SwapConfirming { tx_hash } => format!("swap submitted {tx_hash:#x}; waiting for confirmation"),
        Phase::Success { tx_hash } => format!("swap confirmed {tx_hash:#x}"),
    };
    stderr_writeln(&format!("blockbank: {line}"));
}

pub fn print_notice(notice: &Notice) {
    let what = match notice.kind {
        NoticeKind::ApprovalConfirmed => "Approval successful",
        NoticeKind::SwapConfirmed => "Swap successful",
    };
    stderr_writeln(&format!("blockbank: {what} ({:#x})", notice.tx_hash));
}

pub fn warn_high_slippage(tol: SlippageTolerance) {
    stderr_writeln(&format!(
        "blockbank: warning: slippage tolerance {}% is high; the trade may execute at a much worse price",
        tol.percent()
    ));
}

/// Ask on stderr before submitting a write, or bail if non-interactive and `yes` is unset.
pub fn confirm_or_bail(summary: &str, yes: bool) -> eyre::Result<()> {
    if yes {
        return Ok(());
    }
    let interactive = std::io::stdin().is_terminal() && std::io::stderr().is_terminal();
    if !interactive {
        eyre::bail!("refusing to submit transactions non-interactively; pass --yes");
    }

    stderr_writeln(summary);
    stderr_write("Continue? [y/N] ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read confirmation")?;
    let ans = line.trim().to_ascii_lowercase();
    if ans == "y" || ans == "yes" {
        Ok(())
    } else {
        eyre::bail!("cancelled")
    }
}
