use std::path::PathBuf;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

#[derive(Debug)]
pub struct Statistics {
    pub successful_tasks: usize,
    pub problems: Vec<ProblemReport>,
    pub failures: Vec<ErrorReport>,
    pub failed_downloads: Vec<FailedDownload>,
}

/// An episode fetch that did not complete this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDownload {
    pub source: String,
    pub destination: PathBuf,
}

#[derive(Debug)]
pub struct StatisticsCollector {
    sender: UnboundedSender<TaskReport>,
    receiver: UnboundedReceiver<TaskReport>,
}

impl StatisticsCollector {
    /// Create a new statistics collector.
    pub fn new() -> Self {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();

        Self { sender, receiver }
    }

    /// Get a sender to send statistics.
    pub fn sender(&self) -> StatisticsSender {
        StatisticsSender {
            sender: self.sender.clone(),
        }
    }

    /// Drain every report sent so far.
    ///
    /// Reports sent after this call are dropped.
    pub fn finish(mut self) -> Statistics {
        self.receiver.close();

        let mut stats = Statistics {
            successful_tasks: 0,
            problems: Vec::new(),
            failures: Vec::new(),
            failed_downloads: Vec::new(),
        };

        while let Ok(report) = self.receiver.try_recv() {
            match report.data {
                TaskDataPoint::Succeeded => stats.successful_tasks += 1,
                TaskDataPoint::Failed(err) => stats.failures.push(ErrorReport {
                    task_name: report.name,
                    error: err,
                }),
                TaskDataPoint::EncounteredProblem(err) => stats.problems.push(ProblemReport {
                    task_name: report.name,
                    error: err,
                }),
                TaskDataPoint::DownloadFailed(download) => {
                    stats.failed_downloads.push(download)
                }
            }
        }

        stats
    }
}

#[derive(Debug)]
pub struct ProblemReport {
    pub task_name: String,
    pub error: Box<dyn std::error::Error + Send + 'static>,
}

#[derive(Debug)]
pub struct ErrorReport {
    pub task_name: String,
    pub error: Box<dyn std::error::Error + Send + 'static>,
}

#[derive(Debug)]
pub struct TaskReport {
    name: String,
    data: TaskDataPoint,
}

#[derive(Debug, Clone)]
pub struct StatisticsSender {
    sender: UnboundedSender<TaskReport>,
}

impl StatisticsSender {
    pub fn send_succeeded(&self, name: impl Into<String>) {
        let _ = self.sender.send(TaskReport {
            name: name.into(),
            data: TaskDataPoint::Succeeded,
        });
    }

    pub fn send_failed(
        &self,
        name: impl Into<String>,
        error: impl std::error::Error + Send + 'static,
    ) {
        let name = name.into();
        tracing::error!("Task failed: {}: {}", name, error);
        log_causes(&error);

        let _ = self.sender.send(TaskReport {
            name,
            data: TaskDataPoint::Failed(Box::new(error)),
        });
    }

    pub fn send_problem(
        &self,
        name: impl Into<String>,
        error: impl std::error::Error + Send + 'static,
    ) {
        let name = name.into();
        tracing::warn!("Task encountered a problem: {}: {}", name, error);
        log_causes(&error);

        let _ = self.sender.send(TaskReport {
            name,
            data: TaskDataPoint::EncounteredProblem(Box::new(error)),
        });
    }

    /// Record an episode fetch that failed; it is reported only as a failed download.
    pub fn send_download_failed(
        &self,
        download: FailedDownload,
        error: impl std::error::Error + Send + 'static,
    ) {
        tracing::error!(
            "Download failed: {} -> {}: {}",
            download.source,
            download.destination.display(),
            error
        );
        log_causes(&error);

        let _ = self.sender.send(TaskReport {
            name: format!("download {}", download.source),
            data: TaskDataPoint::DownloadFailed(download),
        });
    }

    /// Record the outcome of a unit of work and hand back its value on success.
    pub fn guard<T, E>(&self, name: impl Into<String>, result: Result<T, E>) -> Option<T>
    where
        E: std::error::Error + Send + 'static,
    {
        match result {
            Ok(v) => {
                self.send_succeeded(name);
                Some(v)
            }
            Err(err) => {
                self.send_failed(name, err);
                None
            }
        }
    }
}

fn log_causes(error: &dyn std::error::Error) {
    let mut src = error.source();
    while let Some(err) = src {
        tracing::error!("-> Caused by: {}", err);
        src = err.source();
    }
}

#[derive(Debug)]
enum TaskDataPoint {
    Succeeded,
    Failed(Box<dyn std::error::Error + Send + 'static>),
    EncounteredProblem(Box<dyn std::error::Error + Send + 'static>),
    DownloadFailed(FailedDownload),
}
