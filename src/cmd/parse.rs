//! Directive inspection command: `kanbanmgr parse`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use kanbanmgr::board::directive::{deadline_zone, format_date, is_deadline_passed, parse_deadline};

pub fn cmd_parse(title: &str, now: Option<&str>) -> Result<()> {
    let now = match now {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid --now '{}': expected RFC 3339", raw))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let deadline = parse_deadline(&now, title)?;
    let overdue = is_deadline_passed(deadline.date, &now);

    println!("Directive: {}", deadline.directive);
    println!("Deadline:  {}", format_date(deadline.date));
    println!("Reference: {}", now.with_timezone(&deadline_zone()).to_rfc3339());
    println!("Overdue:   {}", if overdue { "yes" } else { "no" });
    Ok(())
}
