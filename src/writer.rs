use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use fuzzy_kmeans::{
    ClusterError, ClusterResult, ClusterSnapshot, FuzzyKMeans, FuzzyKMeansContext, LabelRecord, LabelSink, RunSummary,
};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Collects labeling records as JSON lines, one record per line
#[derive(Default)]
pub struct JsonLinesSink {
    buffer: String,
    records: usize,
}

impl LabelSink for JsonLinesSink {
    fn accept(&mut self, record: LabelRecord) -> ClusterResult<()> {
        let line = serde_json::to_string(&record).map_err(|e| ClusterError::Sink(e.to_string()))?;
        self.buffer.push_str(&line);
        self.buffer.push('\n');
        self.records += 1;
        Ok(())
    }
}

impl JsonLinesSink {
    pub fn records(&self) -> usize {
        self.records
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut file = BufWriter::new(file);
    file.write_all(contents).await?;
    file.flush().await?;
    Ok(())
}

/// Output layout of one run: `<outdir>/<timestamp>/`
pub struct RunFolder {
    root: PathBuf,
}

impl RunFolder {
    pub async fn create(outdir: &Path, time: i64) -> Result<Self> {
        let root = outdir.join(time.to_string());
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create output directory {}", root.display()))?;
        info!("Output directory created: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_path(&self, iteration: usize) -> PathBuf {
        self.root.join(format!("clusters-{}.json", iteration))
    }

    pub async fn write_context(&self, context: &FuzzyKMeansContext) -> Result<()> {
        let json = serde_json::to_string_pretty(context)?;
        write_file(&self.root.join("context.json"), json.as_bytes()).await
    }

    /// `clusters-<iteration>.json`
    pub async fn write_snapshot(&self, snapshot: &ClusterSnapshot) -> Result<()> {
        for cluster in snapshot.clusters.iter() {
            debug!("Writing Cluster {}", cluster);
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        write_file(&self.snapshot_path(snapshot.iteration), json.as_bytes()).await
    }

    pub async fn write_snapshots(&self, snapshots: &[ClusterSnapshot]) -> Result<()> {
        for snapshot in snapshots {
            self.write_snapshot(snapshot).await?;
        }
        Ok(())
    }

    /// Write snapshots as they arrive until every sender is gone
    pub async fn record_snapshots(&self, mut published: mpsc::Receiver<ClusterSnapshot>) -> Result<usize> {
        let mut written = 0;
        while let Some(snapshot) = published.recv().await {
            self.write_snapshot(&snapshot).await?;
            written += 1;
        }
        Ok(written)
    }

    pub async fn write_labels(&self, sink: &JsonLinesSink) -> Result<PathBuf> {
        let dir = self.root.join("clusteredPoints");
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join("points.jsonl");
        write_file(&path, sink.buffer.as_bytes()).await?;
        Ok(path)
    }
}

/// Run the refinement on a blocking thread, writing every snapshot to
/// `folder` as soon as the engine publishes it.
///
/// The engine is handed back together with the refinement result, so a failed
/// run still leaves its published snapshots on disk and the caller can report
/// where to resume from. The outer error is for I/O on the folder only.
pub async fn refine_and_record(
    folder: &RunFolder,
    mut engine: FuzzyKMeans,
    points: Arc<Vec<Vec<f64>>>,
) -> Result<(FuzzyKMeans, ClusterResult<RunSummary>)> {
    // Seeds and anything published before this run
    folder.write_snapshots(engine.history()).await?;

    let (tx, rx) = mpsc::channel::<ClusterSnapshot>(16);
    let task = tokio::task::spawn_blocking(move || {
        let result = engine.run_with(&points, |snapshot| {
            tx.blocking_send(snapshot.clone())
                .map_err(|e| ClusterError::Sink(e.to_string()))
        });
        (engine, result)
    });

    let recorded = folder.record_snapshots(rx).await;
    let (engine, result) = task.await.context("Clustering task panicked")?;
    let written = recorded?;
    debug!(written, "Snapshots recorded");
    Ok((engine, result))
}
