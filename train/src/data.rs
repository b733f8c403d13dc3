//! The data feeding worker.

use crate::common::*;

/// The stage of an epoch a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Train,
    Eval,
}

/// Messages from the feeder to the training worker.
#[derive(Debug)]
pub enum FeedMessage {
    Batch {
        epoch: usize,
        phase: Phase,
        batch: TrainingBatch,
    },
    /// All batches of this phase were sent.
    EndOfPhase { epoch: usize, phase: Phase },
}

/// Produces shuffled training batches and fixed-order evaluation batches.
///
/// Partners are drawn sequentially from the feeder's generator before the
/// images are decoded in parallel, so the batches of a seed do not depend on
/// the number of workers.
#[derive(Debug)]
pub struct DataFeeder {
    dataset: Arc<PairedViewDataset>,
    split: DatasetSplit,
    num_epochs: usize,
    batch_size: usize,
    num_workers: usize,
    rng: StdRng,
}

impl DataFeeder {
    pub fn new(
        dataset: Arc<PairedViewDataset>,
        split: DatasetSplit,
        num_epochs: usize,
        batch_size: usize,
        num_workers: usize,
        rng: StdRng,
    ) -> Result<Self> {
        ensure!(batch_size > 0, "batch_size must be positive");
        ensure!(num_workers > 0, "num_workers must be positive");
        ensure!(!split.train.is_empty(), "the training split is empty");

        Ok(Self {
            dataset,
            split,
            num_epochs,
            batch_size,
            num_workers,
            rng,
        })
    }

    pub fn num_train_batches(&self) -> usize {
        (self.split.train.len() + self.batch_size - 1) / self.batch_size
    }

    /// Feed every epoch into `tx`, then return.
    pub async fn run(mut self, tx: mpsc::Sender<FeedMessage>) -> Result<()> {
        for epoch in 1..=self.num_epochs {
            let mut train_indices = self.split.train.clone();
            train_indices.shuffle(&mut self.rng);
            self.feed_phase(epoch, Phase::Train, &train_indices, &tx)
                .instrument(trace_span!("feed_train", epoch))
                .await?;

            let val_indices = self.split.val.clone();
            self.feed_phase(epoch, Phase::Eval, &val_indices, &tx)
                .instrument(trace_span!("feed_eval", epoch))
                .await?;
        }
        Ok(())
    }

    async fn feed_phase(
        &mut self,
        epoch: usize,
        phase: Phase,
        indices: &[usize],
        tx: &mpsc::Sender<FeedMessage>,
    ) -> Result<()> {
        for chunk in indices.chunks(self.batch_size) {
            let pairs: Vec<RecordPair> = chunk
                .iter()
                .map(|&index| self.dataset.index().pair(index, &mut self.rng))
                .collect::<Result<_>>()?;
            let batch = load_batch(&self.dataset, pairs, self.num_workers).await?;

            tx.send(FeedMessage::Batch {
                epoch,
                phase,
                batch,
            })
            .await
            .map_err(|_| format_err!("failed to send message to training worker"))?;
        }

        tx.send(FeedMessage::EndOfPhase { epoch, phase })
            .await
            .map_err(|_| format_err!("failed to send message to training worker"))?;
        Ok(())
    }
}

/// Decode the samples of drawn pairs on blocking threads and stack them.
pub async fn load_batch(
    dataset: &Arc<PairedViewDataset>,
    pairs: Vec<RecordPair>,
    num_workers: usize,
) -> Result<TrainingBatch> {
    let samples: Vec<TrainingSample> = stream::iter(pairs)
        .map(|pair| {
            let dataset = dataset.clone();
            tokio::task::spawn_blocking(move || dataset.load(&pair))
                .map(|result| Fallible::Ok(result??))
        })
        .buffered(num_workers)
        .try_collect()
        .await?;
    TrainingBatch::from_samples(&samples)
}
