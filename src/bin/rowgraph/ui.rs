//! Text-mode output: stat blocks, edge walks, status lines and a spinner.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::{Color, Style};

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Theme {
    Auto,
    Plain,
}

/// Colours used when stdout is a terminal and the theme allows it.
struct Styles {
    title: Style,
    label: Style,
    ok: Style,
    warn: Style,
}

impl Styles {
    fn terminal() -> Self {
        Self {
            title: Style::new().fg(Color::Cyan).bold(),
            label: Style::new().fg(Color::LightBlue),
            ok: Style::new().fg(Color::Green).bold(),
            warn: Style::new().fg(Color::Yellow).bold(),
        }
    }
}

pub struct Ui {
    styles: Option<Styles>,
    // JSON output owns stdout; status text and the spinner stay off.
    silent: bool,
}

impl Ui {
    pub fn new(theme: Theme, silent: bool) -> Self {
        let styled = theme == Theme::Auto && !silent && std::io::stdout().is_terminal();
        #[cfg(windows)]
        if styled {
            let _ = nu_ansi_term::enable_ansi_support();
        }
        Self {
            styles: styled.then(Styles::terminal),
            silent,
        }
    }

    /// Prints `title` followed by `label: value` rows aligned on the colon.
    pub fn stats(&self, title: &str, rows: &[(&str, String)]) {
        println!("{}", self.title(title));
        let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
        for (label, value) in rows {
            let label = format!("{label:<width$}");
            println!("  {}  {value}", self.paint(|s| s.label, &label));
        }
    }

    /// Prints an edge walk, one pre-formatted line per hop.
    pub fn walk(&self, title: &str, hops: &[String]) {
        println!("{}", self.title(title));
        if hops.is_empty() {
            println!("  no outgoing edges");
        }
        for hop in hops {
            println!("  {hop}");
        }
    }

    pub fn ok(&self, message: &str) {
        println!("{}", self.status(|s| s.ok, "ok", message));
    }

    pub fn warn(&self, message: &str) {
        eprintln!("{}", self.status(|s| s.warn, "warning", message));
    }

    /// Spins on stderr while a long step runs. Absent without a terminal.
    pub fn spinner(&self, label: String) -> Spinner {
        let bar = (!self.silent && std::io::stderr().is_terminal()).then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
                bar.set_style(style);
            }
            bar.set_message(label.clone());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        Spinner {
            bar,
            label,
            started: Instant::now(),
        }
    }

    fn title(&self, title: &str) -> String {
        self.paint(|s| s.title, title)
    }

    fn status(&self, style: fn(&Styles) -> Style, tag: &str, message: &str) -> String {
        format!("{}: {message}", self.paint(style, tag))
    }

    fn paint(&self, style: fn(&Styles) -> Style, text: &str) -> String {
        match &self.styles {
            Some(styles) => style(styles).paint(text).to_string(),
            None => text.to_owned(),
        }
    }
}

pub struct Spinner {
    bar: Option<ProgressBar>,
    label: String,
    started: Instant,
}

impl Spinner {
    /// Replaces the text after the label, e.g. the phase being run.
    pub fn phase(&self, phase: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{}: {phase}", self.label));
        }
    }

    pub fn done(self) -> Duration {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
        self.started.elapsed()
    }
}

/// Seconds with millisecond precision, or whole milliseconds below one second.
pub fn human_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1_000 {
        format!("{millis} ms")
    } else {
        format!("{:.3} s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> Ui {
        Ui {
            styles: None,
            silent: false,
        }
    }

    #[test]
    fn plain_output_has_no_escape_codes() {
        let ui = plain();
        assert_eq!(ui.status(|s| s.ok, "ok", "done"), "ok: done");
        assert_eq!(ui.title("Iteration 1"), "Iteration 1");
    }

    #[test]
    fn terminal_output_is_painted() {
        let ui = Ui {
            styles: Some(Styles::terminal()),
            silent: false,
        };
        let line = ui.status(|s| s.warn, "warning", "no ranks");
        assert!(line.contains("\u{1b}["));
        assert!(line.ends_with(": no ranks"));
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(human_duration(Duration::from_millis(85)), "85 ms");
        assert_eq!(human_duration(Duration::from_millis(1_240)), "1.240 s");
    }

    #[test]
    fn spinner_without_terminal_still_times() {
        let ui = Ui {
            styles: None,
            silent: true,
        };
        let spinner = ui.spinner("loading".into());
        spinner.phase("seeding");
        assert!(spinner.done() < Duration::from_secs(60));
    }
}
