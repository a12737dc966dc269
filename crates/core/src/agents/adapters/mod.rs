//! Agent channel adapter implementations.

mod claude_cli;

pub use claude_cli::ClaudeCliChannel;
