use std::sync::mpsc;
use std::thread;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where listener callbacks run.
pub trait ExecutionContext: Send + Sync {
    fn run(&self, job: Job);
}

enum Command {
    Run(Job),
    Terminate,
}

/// A dedicated worker thread running jobs in submission order.
///
/// Default context for browser callbacks. A panicking job is caught and
/// logged; the worker keeps going.
pub struct CallbackThread {
    sender: mpsc::Sender<Command>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CallbackThread {
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(Command::Run(job)) = receiver.recv() {
                    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
                        log::error!("listener callback panicked");
                    }
                }
            })?;

        Ok(CallbackThread {
            sender,
            thread: Some(thread),
        })
    }
}

impl ExecutionContext for CallbackThread {
    fn run(&self, job: Job) {
        if self.sender.send(Command::Run(job)).is_err() {
            log::debug!("callback thread is gone, dropping job");
        }
    }
}

impl Drop for CallbackThread {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Terminate);
        if let Some(thread) = self.thread.take() {
            // Dropped from one of our own callbacks: the worker exits on its own.
            if thread.thread().id() == thread::current().id() {
                return;
            }
            let _ = thread.join();
        }
    }
}

/// Runs jobs on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inline;

impl ExecutionContext for Inline {
    fn run(&self, job: Job) {
        job();
    }
}

/// Runs jobs as tasks on a tokio runtime. Jobs may run concurrently and
/// out of order on a multi-threaded runtime.
impl ExecutionContext for tokio::runtime::Handle {
    fn run(&self, job: Job) {
        self.spawn(async move { job() });
    }
}
