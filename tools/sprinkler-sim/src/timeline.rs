//! Human-readable session output.

use colored::Colorize;

use crate::{Args, Outcome};

pub(crate) fn print(args: &Args, outcome: &Outcome) {
    let sent = outcome.transport.sent();

    println!("{}", "Notification timeline".bold());
    if sent.is_empty() {
        println!("  (nothing sent)");
    }
    for message in &sent {
        let at = message.at.duration_since(outcome.start).as_secs();
        let to: Vec<&str> = message.recipients.iter().map(|c| c.as_str()).collect();
        println!(
            "  {} {} {}",
            format!("{at:>5}s").cyan(),
            label(&message.message),
            to.join(", ").yellow()
        );
        println!("         {}", message.message.dimmed());
    }
    println!();

    match &outcome.report {
        Some(report) => {
            println!(
                "{} after {}s: {} notification(s), {} exit blink(s), shutdown called {} time(s)",
                "Acknowledged".green().bold(),
                report.elapsed_secs,
                report.notifications,
                report.exit_blinks,
                outcome.shutdown.calls()
            );
        }
        None => {
            let hint = match args.press_at {
                Some(at) if at < args.run_for => "press came too late to finish",
                Some(_) => "press scheduled after the end of the run",
                None => "no press scheduled",
            };
            println!(
                "{} after {}s of virtual time ({})",
                "Still alarming".red().bold(),
                args.run_for,
                hint
            );
        }
    }
}

/// The step label from a message, colored by severity.
fn label(message: &str) -> colored::ColoredString {
    let kind = message
        .split(" -- ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("?");

    let padded = format!("{kind:<6}");
    match kind {
        "FIRST" => padded.normal(),
        "SECOND" => padded.yellow(),
        "THIRD" => padded.red(),
        _ => padded.red().bold(),
    }
}
