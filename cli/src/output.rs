use colored::Colorize;

pub fn header(title: &str) {
    println!("{}", title.bold().underline());
}

/// One aligned `label: value` line.
pub fn field(label: &str, value: &str) {
    println!("  {} {}", format!("{label}:").dimmed(), value.cyan());
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "error:".red().bold(), msg);
}

pub fn json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
