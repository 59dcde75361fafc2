// ============================================================
// Layer 5 — Burn-backed Seq2SeqModel
// ============================================================
// Wraps an output network (`CopyNet` for denoising, `TaggerNet`
// for tagging) and its Adam optimiser behind the `Seq2SeqModel`
// seam.
//
// Key Burn 0.20 insight:
//   - Training runs on B (Autodiff<...>) so loss.backward() works
//   - Forward-only steps run on net.valid(), the inner backend,
//     which also switches dropout off
//   - Gradient-norm clipping lives in the optimiser config
//
// Parameters are written with CompactRecorder (MessagePack +
// gzip, half precision); the recorder appends ".mpk.gz" to the
// path it is given.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{ensure, Context, Result};
use burn::{
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use std::path::{Path, PathBuf};

use crate::domain::traits::{Batch, Logits, Seq2SeqModel, StepMode, StepOutput};
use crate::ml::model::{weighted_cross_entropy, CopyNet, CopyNetConfig, NetworkShape, OutputNetwork};
use crate::ml::tagger::{TaggerNet, TaggerNetConfig};

pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

pub fn default_device() -> burn::backend::wgpu::WgpuDevice {
    burn::backend::wgpu::WgpuDevice::default()
}

pub struct BurnSeq2Seq<B: AutodiffBackend, N: AutodiffModule<B> = CopyNet<B>> {
    net:        N,
    optim:      OptimizerAdaptor<Adam, N, B>,
    shape:      NetworkShape,
    batch_size: usize,
    device:     B::Device,
}

impl<B: AutodiffBackend> BurnSeq2Seq<B> {
    pub fn new(config: CopyNetConfig, max_gradient_norm: f32, batch_size: usize, device: B::Device) -> Self {
        tracing::info!(
            "Copy model ready: {} encoder layers, d_model={}, |V_src|={}, |V_tgt|={}",
            config.num_layers,
            config.d_model,
            config.source_vocab_size,
            config.target_vocab_size
        );
        let net = config.init::<B>(&device);
        Self::with_network(net, config.shape(), max_gradient_norm, batch_size, device)
    }
}

impl<B: AutodiffBackend> BurnSeq2Seq<B, TaggerNet<B>> {
    pub fn tagger(config: TaggerNetConfig, max_gradient_norm: f32, batch_size: usize, device: B::Device) -> Self {
        tracing::info!(
            "Tagger ready: {} encoder layers, d_model={}, |V_src|={}, {} labels",
            config.num_layers,
            config.d_model,
            config.source_vocab_size,
            config.num_labels
        );
        let net = config.init::<B>(&device);
        Self::with_network(net, config.shape(), max_gradient_norm, batch_size, device)
    }
}

impl<B: AutodiffBackend, N: AutodiffModule<B>> BurnSeq2Seq<B, N> {
    fn with_network(
        net:               N,
        shape:             NetworkShape,
        max_gradient_norm: f32,
        batch_size:        usize,
        device:            B::Device,
    ) -> Self {
        let optim = AdamConfig::new()
            .with_epsilon(1e-8)
            .with_grad_clipping(Some(GradientClippingConfig::Norm(max_gradient_norm)))
            .init();
        Self { net, optim, shape, batch_size, device }
    }

    fn check_batch(&self, batch: &Batch) -> Result<()> {
        ensure!(!batch.is_empty(), "cannot run a step on an empty batch");
        ensure!(
            batch.encoder_len() <= self.shape.max_source_len && batch.decoder_len() <= self.shape.max_target_len,
            "batch shape {}x{} exceeds the network's {}x{}",
            batch.encoder_len(),
            batch.decoder_len(),
            self.shape.max_source_len,
            self.shape.max_target_len
        );
        ensure!(
            !self.shape.aligned || batch.decoder_len() <= batch.encoder_len(),
            "tag batch decodes {} steps over {} source positions",
            batch.decoder_len(),
            batch.encoder_len()
        );
        let max_source_id = batch.encoder_inputs.iter().flatten().copied().max().unwrap_or(0);
        ensure!(
            (max_source_id as usize) < self.shape.source_vocab_size,
            "source id {max_source_id} is outside the source vocabulary ({})",
            self.shape.source_vocab_size
        );
        Ok(())
    }
}

impl<B, N> Seq2SeqModel for BurnSeq2Seq<B, N>
where
    B: AutodiffBackend,
    N: AutodiffModule<B> + OutputNetwork<B>,
    N::InnerModule: OutputNetwork<B::InnerBackend>,
{
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size;
    }

    fn step(&mut self, batch: &Batch, _bucket_id: usize, mode: StepMode) -> Result<StepOutput> {
        self.check_batch(batch)?;
        let target_len = batch.decoder_len();

        match mode {
            StepMode::Train { learning_rate } => {
                let source  = int_rows::<B>(&batch.encoder_inputs, &self.device);
                let targets = int_rows::<B>(&batch.decoder_targets, &self.device);
                let weights = float_rows::<B>(&batch.target_weights, &self.device);

                let logits = self.net.forward_logits(source, target_len);
                let loss = weighted_cross_entropy(logits.clone(), targets, weights);
                let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();

                // Backward pass + Adam update
                let grads = GradientsParams::from_grads(loss.backward(), &self.net);
                self.net = self.optim.step(learning_rate, self.net.clone(), grads);

                Ok(StepOutput {
                    gradient_norm: None,
                    loss:          loss_value,
                    logits:        to_logits(logits.inner())?,
                })
            }
            StepMode::ForwardOnly => {
                let net = self.net.valid();
                let source  = int_rows::<B::InnerBackend>(&batch.encoder_inputs, &self.device);
                let targets = int_rows::<B::InnerBackend>(&batch.decoder_targets, &self.device);
                let weights = float_rows::<B::InnerBackend>(&batch.target_weights, &self.device);

                let logits = net.forward_logits(source, target_len);
                let loss: f64 = weighted_cross_entropy(logits.clone(), targets, weights).into_scalar().elem::<f64>();

                Ok(StepOutput { gradient_norm: None, loss, logits: to_logits(logits)? })
            }
        }
    }

    fn save(&self, prefix: &Path, global_step: u64) -> Result<PathBuf> {
        let path = PathBuf::from(format!("{}-{global_step}", prefix.display()));
        let recorder = CompactRecorder::new();
        Recorder::<B>::record(&recorder, self.net.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save parameters to '{}'", path.display()))?;
        Ok(path)
    }

    fn restore(&mut self, path: &Path) -> Result<()> {
        let recorder = CompactRecorder::new();
        let record: N::Record = Recorder::<B>::load(&recorder, path.to_path_buf(), &self.device)
            .with_context(|| format!("Cannot load parameters from '{}'", path.display()))?;
        self.net = self.net.clone().load_record(record);
        Ok(())
    }
}

// ─── Tensor conversion ────────────────────────────────────────────────────────
fn int_rows<B: Backend>(rows: &[Vec<u32>], device: &B::Device) -> Tensor<B, 2, Int> {
    let width = rows.first().map_or(0, Vec::len);
    let flat: Vec<i32> = rows.iter().flatten().map(|&id| id as i32).collect();
    Tensor::<B, 1, Int>::from_ints(flat.as_slice(), device).reshape([rows.len(), width])
}

fn float_rows<B: Backend>(rows: &[Vec<f32>], device: &B::Device) -> Tensor<B, 2> {
    let width = rows.first().map_or(0, Vec::len);
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([rows.len(), width])
}

fn to_logits<B: Backend>(logits: Tensor<B, 3>) -> Result<Logits> {
    let [batch, steps, classes] = logits.dims();
    let values = logits
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read logits: {e:?}"))?;
    Logits::new(batch, steps, classes, values)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::BatchAssembler;
    use crate::data::dataset::BucketedDataset;
    use crate::domain::sequence::{Bucket, SequencePair};
    use crate::domain::vocabulary::EOS_ID;
    use burn::backend::{Autodiff, NdArray};
    use rand::{rngs::StdRng, SeedableRng};

    type TestBackend = Autodiff<NdArray>;

    fn model() -> BurnSeq2Seq<TestBackend> {
        let config = CopyNetConfig::new(10, 8, 6, 6, 16, 2, 1).with_dropout(0.0);
        BurnSeq2Seq::new(config, 5.0, 2, Default::default())
    }

    fn batch() -> Batch {
        let mut dataset = BucketedDataset::new(&[Bucket::new(3, 3), Bucket::new(6, 6)]);
        dataset.extend([
            SequencePair::new(vec![4, 5], vec![4, EOS_ID], 0),
            SequencePair::new(vec![6, 7], vec![8 + 1, EOS_ID], 1),
        ]);
        let mut rng = StdRng::seed_from_u64(0);
        BatchAssembler::new(false).assemble(&dataset, 0, 2, Some(0), 0.0, &mut rng).unwrap()
    }

    #[test]
    fn test_forward_only_shapes() {
        let mut m = model();
        let out = m.step(&batch(), 0, StepMode::ForwardOnly).unwrap();
        assert_eq!(out.logits.batch(), 2);
        assert_eq!(out.logits.steps(), 3);
        assert_eq!(out.logits.classes(), 8 + 3);
        assert!(out.loss.is_finite() && out.loss > 0.0);
        assert!(out.gradient_norm.is_none());
    }

    #[test]
    fn test_training_lowers_loss_on_a_fixed_batch() {
        let mut m = model();
        let b = batch();
        let before = m.step(&b, 0, StepMode::ForwardOnly).unwrap().loss;
        for _ in 0..30 {
            m.step(&b, 0, StepMode::Train { learning_rate: 0.01 }).unwrap();
        }
        let after = m.step(&b, 0, StepMode::ForwardOnly).unwrap().loss;
        assert!(after < before, "loss went from {before} to {after}");
    }

    #[test]
    fn test_out_of_vocabulary_source_id_is_rejected() {
        let mut m = model();
        let mut b = batch();
        b.encoder_inputs[0][0] = 10;
        assert!(m.step(&b, 0, StepMode::ForwardOnly).is_err());
    }

    #[test]
    fn test_restored_model_matches_trained_loss() {
        let dir = tempfile::tempdir().unwrap();
        let mut trained = model();
        let b = batch();
        for _ in 0..5 {
            trained.step(&b, 0, StepMode::Train { learning_rate: 0.01 }).unwrap();
        }
        let path = trained.save(&dir.path().join("denoiser_ckpt"), 5).unwrap();
        assert!(path.ends_with("denoiser_ckpt-5"));

        let mut restored = model();
        restored.restore(&path).unwrap();

        let expected = trained.step(&b, 0, StepMode::ForwardOnly).unwrap().loss;
        let actual = restored.step(&b, 0, StepMode::ForwardOnly).unwrap().loss;
        let fresh = model().step(&b, 0, StepMode::ForwardOnly).unwrap().loss;
        // Parameters are stored at half precision.
        assert!((expected - actual).abs() < 1e-2, "restored {actual}, trained {expected}");
        assert!((fresh - expected).abs() > 0.1, "fresh {fresh}, trained {expected}");
    }

    fn tagger() -> BurnSeq2Seq<TestBackend, TaggerNet<TestBackend>> {
        let config = TaggerNetConfig::new(10, 6, 6, 16, 2, 1).with_dropout(0.0);
        BurnSeq2Seq::tagger(config, 5.0, 2, Default::default())
    }

    fn tag_batch() -> Batch {
        let mut dataset = BucketedDataset::new(&[Bucket::new(3, 3)]);
        dataset.extend([
            SequencePair::new(vec![4, 5], vec![4, 5], 0),
            SequencePair::new(vec![6], vec![4], 1),
        ]);
        let mut rng = StdRng::seed_from_u64(0);
        BatchAssembler::new(false).assemble(&dataset, 0, 2, Some(0), 0.0, &mut rng).unwrap()
    }

    #[test]
    fn test_tagger_scores_labels_and_learns() {
        let mut m = tagger();
        let b = tag_batch();
        let before = m.step(&b, 0, StepMode::ForwardOnly).unwrap();
        assert_eq!(before.logits.steps(), 3);
        assert_eq!(before.logits.classes(), 6);
        for _ in 0..30 {
            m.step(&b, 0, StepMode::Train { learning_rate: 0.01 }).unwrap();
        }
        let after = m.step(&b, 0, StepMode::ForwardOnly).unwrap().loss;
        assert!(after < before.loss, "loss went from {} to {after}", before.loss);
    }

    #[test]
    fn test_tagger_rejects_decoding_past_the_source() {
        let mut m = tagger();
        let mut b = tag_batch();
        for row in &mut b.encoder_inputs {
            row.truncate(2);
        }
        assert!(m.step(&b, 0, StepMode::ForwardOnly).is_err());
    }
}
