use crate::ui::icons::{CHECK, COMPACT, CONSULT, CROSS, PAUSE, RETRY, RUNNING, SAVE, SPARKLE, WARN};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Terminal UI for a workflow run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Step bar: how many steps of the workflow have been executed
/// - Activity bar: spinner describing what the current step is doing
///
/// All output is routed through `MultiProgress` so log lines never tear the bars.
pub struct StepUI {
    multi: MultiProgress,
    step_bar: ProgressBar,
    activity_bar: ProgressBar,
    verbose: bool,
    current_step: AtomicUsize,
    total_steps: AtomicUsize,
}

fn template(base: ProgressStyle, template: &str) -> ProgressStyle {
    match base.clone().template(template) {
        Ok(style) => style,
        Err(_) => base,
    }
}

impl StepUI {
    /// Create the UI for a workflow of `total_steps` steps.
    ///
    /// `start_at` positions the step bar when a session resumes mid-workflow.
    pub fn new(total_steps: usize, start_at: usize, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let step_style = template(
            ProgressStyle::default_bar(),
            "{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .progress_chars("█▓▒░");

        let step_bar = multi.add(ProgressBar::new(total_steps as u64));
        step_bar.set_style(step_style);
        step_bar.set_prefix("Steps");
        step_bar.set_position(start_at as u64);

        let activity_bar = multi.add(ProgressBar::new_spinner());
        activity_bar.set_style(template(
            ProgressStyle::default_spinner(),
            "{prefix:.bold.dim} {spinner} {msg}",
        ));
        activity_bar.set_prefix("  Now");

        Self {
            multi,
            step_bar,
            activity_bar,
            verbose,
            current_step: AtomicUsize::new(start_at),
            total_steps: AtomicUsize::new(total_steps),
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Print the header shown once before the first step.
    pub fn print_header(&self, workflow: &str, session_id: &str) {
        self.print_line("");
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line(format!(
            "{} Workflow {} (session {})",
            style("▶").green().bold(),
            style(workflow).yellow().bold(),
            style(session_id).dim()
        ));
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line("");
    }

    /// Mark a step as started and begin the spinner.
    ///
    /// `index` is the 0-based step position in the workflow.
    pub fn start_step(&self, index: usize, kind: &str, description: &str) {
        let total = self.total_steps.load(Ordering::SeqCst);
        self.current_step.store(index + 1, Ordering::SeqCst);
        self.step_bar
            .set_message(format!("{}: {}", style(kind).yellow(), description));
        self.activity_bar.set_message(format!(
            "Step {}/{} {}",
            style(index + 1).cyan(),
            total,
            style(format!("({})", kind)).dim()
        ));
        self.activity_bar
            .enable_steady_tick(Duration::from_millis(100));
        if self.verbose {
            self.print_line(format!(
                "  {}{} {}",
                RUNNING,
                style(kind).bold(),
                style(description).dim()
            ));
        }
    }

    /// Update the spinner with a short status string.
    ///
    /// In verbose mode the message is also printed as a dim indented line.
    pub fn log_step(&self, msg: &str) {
        let step = self.current_step.load(Ordering::SeqCst);
        let total = self.total_steps.load(Ordering::SeqCst);
        self.activity_bar.set_message(format!(
            "Step {}/{} {}",
            style(step).cyan(),
            total,
            style(format!("({})", msg)).dim()
        ));
        if self.verbose {
            self.print_line(format!("    {} {}", style("→").dim(), style(msg).dim()));
        }
    }

    pub fn step_done(&self) {
        self.step_bar.inc(1);
    }

    /// Show a retry attempt of a `run` step.
    pub fn run_attempt(&self, attempt: u32, max_attempts: u32, command: &str) {
        self.log_step(&format!("attempt {}/{}: {}", attempt, max_attempts, command));
        if attempt > 1 {
            self.print_line(format!(
                "    {}Retrying {} ({}/{})",
                RETRY,
                style(command).yellow(),
                attempt,
                max_attempts
            ));
        }
    }

    /// Show the outcome of a `run` step.
    pub fn run_finished(&self, command: &str, success: bool, attempts: u32) {
        let icon = if success { CHECK } else { CROSS };
        let label = if success {
            style(command).green()
        } else {
            style(command).red()
        };
        self.print_line(format!(
            "    {}{} {}",
            icon,
            label,
            style(format!("({} attempt(s))", attempts)).dim()
        ));
    }

    /// Show a snippet of a model response (verbose mode only).
    pub fn show_response(&self, snippet: &str) {
        if !self.verbose {
            return;
        }
        self.print_line(format!(
            "    {} {}",
            style("💭").dim(),
            style(crate::util::truncate_str(snippet, 100)).dim()
        ));
    }

    pub fn show_checkpoint(&self, name: &str, path: &Path) {
        self.print_line(format!(
            "    {}Checkpoint {} {}",
            SAVE,
            style(name).cyan(),
            style(path.display()).dim()
        ));
    }

    pub fn show_compaction(&self, performed: bool) {
        if performed {
            self.print_line(format!("    {}Context compacted", COMPACT));
        } else {
            self.log_step("compaction not needed");
        }
    }

    pub fn show_warning(&self, msg: &str) {
        self.print_line(format!("    {}{}", WARN, style(msg).yellow()));
    }

    /// Finish the spinner with a pause banner.
    pub fn paused(&self, consult: bool, checkpoint: &Path) {
        let (icon, label) = if consult {
            (CONSULT, "Waiting for consultation")
        } else {
            (PAUSE, "Paused")
        };
        self.activity_bar
            .finish_with_message(format!("{}{}", icon, label));
        self.print_line(format!(
            "\n{}{}: resume from {}\n",
            icon,
            style(label).yellow().bold(),
            checkpoint.display()
        ));
    }

    pub fn completed(&self) {
        self.activity_bar.finish_and_clear();
        self.step_bar.finish();
        self.print_line(format!("\n{}{}\n", SPARKLE, style("Workflow complete").green().bold()));
    }

    pub fn failed(&self, reason: &str) {
        self.activity_bar
            .finish_with_message(format!("{}{}", CROSS, reason));
        self.print_line(format!(
            "\n{}{} {}\n",
            CROSS,
            style("Workflow stopped:").red().bold(),
            reason
        ));
    }
}
