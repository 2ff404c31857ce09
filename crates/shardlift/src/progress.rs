use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use shardlift_pipeline::{JobObserver, JobOutcome};
use shardlift_source::ArchiveJob;

const PB_STYLE: &str =
    "{spinner:.blue} {prefix:>10.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} ({eta}) {msg}";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

static PB_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| {
    let pb_style = match ProgressStyle::with_template(PB_STYLE) {
        Ok(pb_style) => pb_style.tick_chars(TICK).progress_chars(PB_CHARS),
        Err(_) => return None,
    };

    Some(pb_style)
});

/// Counts finished jobs on a terminal progress bar.
pub struct JobProgress {
    pb: ProgressBar,
}

impl JobProgress {
    pub fn new(visible: bool) -> Self {
        let pb = if visible { ProgressBar::new(0) } else { ProgressBar::hidden() };
        let pb = match PB_TEMPLATE.as_ref() {
            Some(style) => pb.with_style(style.clone()),
            None => pb,
        };
        Self {
            pb: pb.with_prefix("migrating"),
        }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl JobObserver for JobProgress {
    fn run_started(&self, jobs: usize) {
        self.pb.set_length(jobs as u64);
        self.pb.enable_steady_tick(std::time::Duration::from_millis(120));
    }

    fn job_finished(&self, job: &ArchiveJob, outcome: &JobOutcome) {
        let mark = if outcome.is_success() { "ok" } else { "failed" };
        self.pb
            .set_message(format!("{mark} {}", job.relative_path().display()));
        self.pb.inc(1);
    }
}
