//! Shared UI icons.
//!
//! Each icon carries a plain-text fallback for terminals without emoji.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");

// Step indicators
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static RETRY: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY]");
pub static SAVE: Emoji<'_, '_> = Emoji("💾 ", "[CKPT]");
pub static PAUSE: Emoji<'_, '_> = Emoji("⏸️  ", "[PAUSE]");
pub static CONSULT: Emoji<'_, '_> = Emoji("🙋 ", "[ASK]");
pub static COMPACT: Emoji<'_, '_> = Emoji("📦 ", "[CMP]");
