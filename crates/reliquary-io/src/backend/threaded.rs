// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::{ByteSource, DecoderRegistry};
use crate::config::BackendConfig;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use reliquary_core::{
    backend::{AssetBackend, AssetFault, BackendError},
    resource::{LoadParams, Resource, ResourceKind},
};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

struct Job {
    path: String,
    kind: ResourceKind,
    params: LoadParams,
    generation: u64,
}

struct Completion {
    path: String,
    generation: u64,
    result: Result<Arc<dyn Resource>>,
}

enum Slot {
    Queued { generation: u64 },
    Loaded(Arc<dyn Resource>),
}

/// An asset backend reading and decoding files on a pool of worker threads.
///
/// Requests are handed to the workers over a channel. Finished work only
/// becomes visible in [`AssetBackend::update`], on the thread that owns the
/// backend. Unloading a queued path discards its result when it arrives.
pub struct ThreadedBackend {
    decoders: Arc<DecoderRegistry>,
    jobs: Option<Sender<Job>>,
    results: Receiver<Completion>,
    inbox: VecDeque<Completion>,
    slots: HashMap<String, Slot>,
    next_generation: u64,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadedBackend {
    /// Starts a backend with `config.workers` worker threads.
    ///
    /// # Errors
    /// Fails when a worker thread cannot be spawned.
    pub fn new(
        source: impl ByteSource,
        decoders: DecoderRegistry,
        config: &BackendConfig,
    ) -> Result<Self> {
        let (job_sender, job_receiver) = crossbeam_channel::unbounded::<Job>();
        let (result_sender, result_receiver) = crossbeam_channel::unbounded::<Completion>();
        let source: Arc<dyn ByteSource> = Arc::new(source);
        let decoders = Arc::new(decoders);

        let workers = (0..config.workers.max(1))
            .map(|index| {
                let jobs = job_receiver.clone();
                let results = result_sender.clone();
                let source = source.clone();
                let decoders = decoders.clone();
                thread::Builder::new()
                    .name(format!("reliquary-io-{index}"))
                    .spawn(move || run_worker(jobs, results, source, decoders))
                    .context("Failed to spawn resource worker thread")
            })
            .collect::<Result<Vec<_>>>()?;
        log::info!("Started threaded asset backend with {} workers", workers.len());

        Ok(Self {
            decoders,
            jobs: Some(job_sender),
            results: result_receiver,
            inbox: VecDeque::new(),
            slots: HashMap::new(),
            next_generation: 0,
            workers,
        })
    }

    fn collect(&mut self) {
        self.inbox.extend(self.results.try_iter());
    }
}

fn run_worker(
    jobs: Receiver<Job>,
    results: Sender<Completion>,
    source: Arc<dyn ByteSource>,
    decoders: Arc<DecoderRegistry>,
) {
    for job in jobs.iter() {
        let result = read_and_decode(&*source, &decoders, &job);
        let completion = Completion {
            path: job.path,
            generation: job.generation,
            result,
        };
        if results.send(completion).is_err() {
            break;
        }
    }
}

fn read_and_decode(
    source: &dyn ByteSource,
    decoders: &DecoderRegistry,
    job: &Job,
) -> Result<Arc<dyn Resource>> {
    let bytes = source
        .read(&job.path)
        .with_context(|| format!("Failed to read '{}'", job.path))?;
    decoders
        .decode(&job.kind, &bytes, &job.params)
        .map_err(|err| as_corrupt(&job.path, err))
        .with_context(|| format!("Failed to decode '{}' as {}", job.path, job.kind))
}

/// Decoder failures mean the bytes are unusable, whatever the decoder said.
fn as_corrupt(path: &str, err: anyhow::Error) -> anyhow::Error {
    if err.chain().any(|cause| cause.is::<AssetFault>()) {
        return err;
    }
    anyhow::Error::new(AssetFault::Corrupt {
        path: path.to_owned(),
        reason: format!("{err:#}"),
    })
}

impl AssetBackend for ThreadedBackend {
    fn load(
        &mut self,
        path: &str,
        kind: &ResourceKind,
        params: &LoadParams,
    ) -> Result<(), BackendError> {
        if self.slots.contains_key(path) {
            return Ok(());
        }
        if !self.decoders.contains(kind) {
            return Err(BackendError::new(
                path,
                anyhow!("No decoder registered for resource kind '{kind}'"),
            ));
        }
        let Some(jobs) = &self.jobs else {
            return Err(BackendError::new(path, anyhow!("The worker pool has shut down")));
        };

        self.next_generation += 1;
        let generation = self.next_generation;
        let job = Job {
            path: path.to_owned(),
            kind: kind.clone(),
            params: params.clone(),
            generation,
        };
        jobs.send(job)
            .map_err(|_| BackendError::new(path, anyhow!("The worker pool has shut down")))?;
        self.slots.insert(path.to_owned(), Slot::Queued { generation });
        Ok(())
    }

    fn unload(&mut self, path: &str) {
        self.slots.remove(path);
    }

    fn get(&self, path: &str) -> Option<Arc<dyn Resource>> {
        match self.slots.get(path) {
            Some(Slot::Loaded(content)) => Some(content.clone()),
            _ => None,
        }
    }

    fn is_loaded(&self, path: &str) -> bool {
        matches!(self.slots.get(path), Some(Slot::Loaded(_)))
    }

    fn update(&mut self) -> Result<bool, BackendError> {
        self.collect();
        while let Some(completion) = self.inbox.pop_front() {
            let current = matches!(
                self.slots.get(&completion.path),
                Some(Slot::Queued { generation }) if *generation == completion.generation
            );
            if !current {
                log::trace!("Discarding stale result for '{}'", completion.path);
                continue;
            }
            match completion.result {
                Ok(content) => {
                    self.slots.insert(completion.path, Slot::Loaded(content));
                }
                Err(source) => {
                    self.slots.remove(&completion.path);
                    return Err(BackendError::new(completion.path, source));
                }
            }
        }
        Ok(self.queued_count() == 0)
    }

    fn queued_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, Slot::Queued { .. }))
            .count()
    }

    fn loaded_count(&self) -> usize {
        self.slots.len() - self.queued_count()
    }

    fn wait_for_completion(&mut self, timeout: Duration) {
        if !self.inbox.is_empty() {
            return;
        }
        match self.results.recv_timeout(timeout) {
            Ok(completion) => self.inbox.push_back(completion),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("All resource workers have stopped");
            }
        }
    }
}

impl Drop for ThreadedBackend {
    fn drop(&mut self) {
        // Closing the job channel ends every worker loop.
        drop(self.jobs.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("A resource worker thread panicked");
            }
        }
    }
}
