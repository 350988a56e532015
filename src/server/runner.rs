//! The work scheduler: a bounded queue of tagged jobs drained by a fixed
//! pool of worker threads.
//!
//! A job is owned by the runner from `push` until its worker sends the
//! single-shot result; the RPC handler thread blocks on the receiving end
//! and serializes the response.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{bounded, Sender};

use crate::cmdline::CompilerCmd;
use crate::errors::*;
use crate::protocol::{
    CompileRequest, CompileResponse, JobKind, PreprocessRequest, PreprocessResponse, StatusJob,
    StatusResponse, WorkerStatus,
};
use crate::server::builder::Builder;
use crate::server::queue::JobQueue;

struct CompileJob {
    cmd: CompilerCmd,
    code: Vec<u8>,
    includes: Vec<crate::protocol::IncludeEntry>,
    source_addr: String,
    done: Sender<Result<CompileResponse>>,
}

struct PreprocessJob {
    dir: String,
    cmd: CompilerCmd,
    source_addr: String,
    done: Sender<Result<PreprocessResponse>>,
}

enum Job {
    Compile(CompileJob),
    Preprocess(PreprocessJob),
}

impl Job {
    fn status_job(&self) -> StatusJob {
        let (cmd, source_addr, mode) = match self {
            Job::Compile(job) => (&job.cmd, &job.source_addr, JobKind::Compile),
            Job::Preprocess(job) => (&job.cmd, &job.source_addr, JobKind::Preprocess),
        };
        StatusJob {
            source_address: source_addr.clone(),
            filename: cmd.input().unwrap_or_else(|_| "???".to_string()),
            command: cmd.command(),
            mode,
        }
    }
}

type WorkerStatusMap = Mutex<HashMap<usize, Arc<Job>>>;

pub struct Runner {
    queue: Arc<JobQueue<Arc<Job>>>,
    num_workers: usize,
    worker_status: Arc<WorkerStatusMap>,
}

impl Runner {
    pub fn new(num_workers: usize, max_queue_size: usize, builder: Builder) -> Result<Runner> {
        let runner = Runner {
            queue: Arc::new(JobQueue::new(max_queue_size)),
            num_workers,
            worker_status: Arc::new(Mutex::new(HashMap::new())),
        };
        let builder = Arc::new(builder);
        debug!("spawning {} workers", num_workers);
        for id in 0..num_workers {
            let queue = runner.queue.clone();
            let builder = builder.clone();
            let worker_status = runner.worker_status.clone();
            thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || worker_loop(id, queue, builder, worker_status))
                .chain_err(|| "failed to spawn worker")?;
        }
        Ok(runner)
    }

    pub fn compile(&self, req: CompileRequest, source_addr: &str) -> Result<CompileResponse> {
        let (done, result) = bounded(1);
        self.queue.push(Arc::new(Job::Compile(CompileJob {
            cmd: CompilerCmd::new(&req.command),
            code: req.code,
            includes: req.includes,
            source_addr: source_addr.to_string(),
            done,
        })))?;
        result.recv().chain_err(|| "worker dropped job result")?
    }

    pub fn preprocess(&self, req: PreprocessRequest, source_addr: &str) -> Result<PreprocessResponse> {
        let (done, result) = bounded(1);
        self.queue.push(Arc::new(Job::Preprocess(PreprocessJob {
            dir: req.dir,
            cmd: CompilerCmd::new(&req.command),
            source_addr: source_addr.to_string(),
            done,
        })))?;
        result.recv().chain_err(|| "worker dropped job result")?
    }

    pub fn status(&self) -> StatusResponse {
        let worker_status = self.worker_status.lock().unwrap();
        let workers = (0..self.num_workers)
            .map(|id| WorkerStatus {
                id,
                job: worker_status.get(&id).map(|job| job.status_job()),
            })
            .collect();
        let queued = self
            .queue
            .list()
            .iter()
            .map(|job| job.status_job())
            .collect();
        StatusResponse {
            workers,
            queued,
            num_workers: self.num_workers,
        }
    }
}

fn worker_loop(
    id: usize,
    queue: Arc<JobQueue<Arc<Job>>>,
    builder: Arc<Builder>,
    worker_status: Arc<WorkerStatusMap>,
) {
    loop {
        queue.wait();
        let job = match queue.take() {
            Some(job) => job,
            None => continue,
        };
        worker_status.lock().unwrap().insert(id, job.clone());
        match &*job {
            Job::Compile(job) => run_compile_job(id, &builder, job),
            Job::Preprocess(job) => run_preprocess_job(id, &builder, job),
        }
        worker_status.lock().unwrap().remove(&id);
    }
}

fn run_compile_job(id: usize, builder: &Builder, job: &CompileJob) {
    let input = job.cmd.input().unwrap_or_else(|_| "???".to_string());
    debug!(
        "worker {}: compiling: input: {} sz: {}",
        id,
        input,
        job.code.len()
    );
    let result = builder.compile(&job.code, &job.cmd, &job.includes);
    match &result {
        Ok(res) => debug!(
            "worker {}: compile complete: input: {} sz: {}",
            id,
            input,
            res.object.len()
        ),
        Err(err) => debug!("worker {}: compile failed: {}", id, error_string(err)),
    }
    let _ = job.done.send(result);
}

fn run_preprocess_job(id: usize, builder: &Builder, job: &PreprocessJob) {
    let input = job.cmd.input().unwrap_or_else(|_| "???".to_string());
    debug!(
        "worker {}: preprocessing: input: {} dir: {}",
        id, input, job.dir
    );
    let result = builder.preprocess(&job.dir, &job.cmd);
    match &result {
        Ok(res) => debug!(
            "worker {}: preprocess complete: input: {} sz: {}",
            id,
            input,
            res.code.len()
        ),
        Err(err) => debug!("worker {}: preprocess failed: {}", id, error_string(err)),
    }
    let _ = job.done.send(result);
}
