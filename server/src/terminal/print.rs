use std::net::SocketAddr;

use colored::*;
use tracing::info;

pub const TOTAL_WIDTH: usize = 64;

pub fn banner(no_banner: bool) {
    if no_banner {
        return;
    }

    let text_content: String = format!("⟦ SCANBOX v{} ⟧ ", env!("CARGO_PKG_VERSION"));
    let text_width: usize = text_content.chars().count();
    let text: ColoredString = text_content.bright_green().bold();
    let sep: ColoredString = "═".repeat(TOTAL_WIDTH.saturating_sub(text_width) / 2).bright_black();

    info!("{}{}{}", sep, text, sep);
}

pub fn header(msg: &str) {
    let formatted: String = format!("⟦ {} ⟧", msg);
    let msg_len: usize = formatted.chars().count();

    let dash_count: usize = TOTAL_WIDTH.saturating_sub(msg_len);
    let left: usize = dash_count / 2;
    let right: usize = dash_count - left;

    info!(
        "{}{}{}",
        "─".repeat(left).bright_black(),
        formatted.to_uppercase().bright_green(),
        "─".repeat(right).bright_black()
    );
}

pub fn listening(addr: SocketAddr) {
    info!("Listening on {}", addr.to_string().bright_cyan().bold());
    info!("Discovery endpoint: {}", "POST /api/host-discovery-scan".cyan());
    info!("Health check: {}", "GET /health".cyan());
}
