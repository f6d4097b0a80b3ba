//! Dense window autoencoder with manual backpropagation + Adam optimizer.
//!
//! Topology: `W -> 16 -> max(4, W/4) -> 16 -> W`, ReLU on the three hidden
//! layers and a sigmoid output (inputs are min-max scaled to `[0, 1]`).
//! Loss is the mean squared reconstruction error over batch and window.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::defaults::{AUTOENCODER_HIDDEN, AUTOENCODER_MIN_CODE};

/// Code width for a window of `window_size` values.
pub fn encoding_dim(window_size: usize) -> usize {
    AUTOENCODER_MIN_CODE.max(window_size / 4)
}

fn relu(x: f64) -> f64 {
    x.max(0.0)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Fully connected layer, weights row-major `outputs × inputs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub inputs: usize,
    pub outputs: usize,
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
}

impl DenseLayer {
    /// Xavier-uniform weights, zero bias.
    fn xavier(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        Self {
            inputs,
            outputs,
            weights: (0..inputs * outputs)
                .map(|_| rng.gen::<f64>() * 2.0 * limit - limit)
                .collect(),
            bias: vec![0.0; outputs],
        }
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        (0..self.outputs)
            .map(|o| {
                let row = &self.weights[o * self.inputs..(o + 1) * self.inputs];
                row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + self.bias[o]
            })
            .collect()
    }

    fn num_params(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    fn is_consistent(&self) -> bool {
        self.weights.len() == self.inputs * self.outputs && self.bias.len() == self.outputs
    }
}

/// The four layers of the autoencoder, in forward order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoencoderWeights {
    pub layers: Vec<DenseLayer>,
}

impl AutoencoderWeights {
    fn num_params(&self) -> usize {
        self.layers.iter().map(DenseLayer::num_params).sum()
    }

    fn params_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.layers
            .iter_mut()
            .flat_map(|l| l.weights.iter_mut().chain(l.bias.iter_mut()))
    }
}

/// Adam optimizer over the flattened parameter vector.
#[derive(Debug, Clone)]
struct AdamOptimizer {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    steps: u64,
    m: Vec<f64>,
    v: Vec<f64>,
}

impl AdamOptimizer {
    fn new(num_params: usize, lr: f64) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            steps: 0,
            m: vec![0.0; num_params],
            v: vec![0.0; num_params],
        }
    }

    fn apply<'a>(&mut self, params: impl Iterator<Item = &'a mut f64>, grads: &[f64]) {
        self.steps += 1;
        let t = self.steps as f64;

        // Bias-corrected LR
        let lr_t = self.lr * (1.0 - self.beta2.powf(t)).sqrt() / (1.0 - self.beta1.powf(t));

        for (i, w) in params.enumerate() {
            let g = grads[i];
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * g;
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * g * g;
            *w -= lr_t * self.m[i] / (self.v[i].sqrt() + self.eps);
        }
    }
}

/// Training schedule for one run.
#[derive(Debug, Clone, Copy)]
pub struct TrainSchedule {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct Autoencoder {
    window_size: usize,
    weights: AutoencoderWeights,
}

impl Autoencoder {
    /// Fresh network for windows of `window_size`, initialised from `seed`.
    pub fn new(window_size: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let code = encoding_dim(window_size);
        let dims = [window_size, AUTOENCODER_HIDDEN, code, AUTOENCODER_HIDDEN, window_size];
        let layers = dims
            .windows(2)
            .map(|d| DenseLayer::xavier(d[0], d[1], &mut rng))
            .collect();
        Self {
            window_size,
            weights: AutoencoderWeights { layers },
        }
    }

    /// Rebuild from stored weights. `None` if the shapes do not chain
    /// `window_size -> ... -> window_size` over four layers.
    pub fn from_weights(window_size: usize, weights: AutoencoderWeights) -> Option<Self> {
        let layers = &weights.layers;
        let chained = layers.len() == 4
            && layers.iter().all(DenseLayer::is_consistent)
            && layers[0].inputs == window_size
            && layers[3].outputs == window_size
            && layers.windows(2).all(|w| w[0].outputs == w[1].inputs);
        chained.then_some(Self {
            window_size,
            weights,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn encoding_dim(&self) -> usize {
        self.weights.layers[1].outputs
    }

    pub fn weights(&self) -> &AutoencoderWeights {
        &self.weights
    }

    /// Pre- and post-activation values of every layer.
    fn forward_cached(&self, input: &[f64]) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let last = self.weights.layers.len() - 1;
        let mut pre = Vec::with_capacity(last + 1);
        let mut post = Vec::with_capacity(last + 2);
        post.push(input.to_vec());

        for (idx, layer) in self.weights.layers.iter().enumerate() {
            let z = layer.forward(&post[idx]);
            let a = if idx == last {
                z.iter().map(|v| sigmoid(*v)).collect()
            } else {
                z.iter().map(|v| relu(*v)).collect()
            };
            pre.push(z);
            post.push(a);
        }
        (pre, post)
    }

    pub fn reconstruct(&self, input: &[f64]) -> Vec<f64> {
        let (_, mut post) = self.forward_cached(input);
        post.pop().unwrap_or_default()
    }

    /// Mean squared reconstruction error of one (scaled) window.
    pub fn reconstruction_error(&self, input: &[f64]) -> f64 {
        let output = self.reconstruct(input);
        output.iter().zip(input).map(|(y, x)| (y - x).powi(2)).sum::<f64>() / input.len().max(1) as f64
    }

    /// Accumulate gradients of the batch loss into `grads`; returns the batch loss.
    fn backprop(&self, batch: &[&[f64]], grads: &mut [f64]) -> f64 {
        let layers = &self.weights.layers;
        let last = layers.len() - 1;
        let scale = 1.0 / (batch.len() * self.window_size) as f64;

        // Offset of each layer in the flattened parameter vector
        let offsets: Vec<usize> = layers
            .iter()
            .scan(0, |acc, l| {
                let start = *acc;
                *acc += l.num_params();
                Some(start)
            })
            .collect();

        let mut loss = 0.0;
        for input in batch {
            let (pre, post) = self.forward_cached(input);
            let output = &post[last + 1];

            // dL/dy for MSE
            let mut delta: Vec<f64> = output
                .iter()
                .zip(input.iter())
                .map(|(y, x)| {
                    loss += (y - x).powi(2) * scale;
                    2.0 * (y - x) * scale
                })
                .collect();

            for idx in (0..=last).rev() {
                let layer = &layers[idx];
                // Through the activation
                let dz: Vec<f64> = if idx == last {
                    delta
                        .iter()
                        .zip(&post[idx + 1])
                        .map(|(d, a)| d * a * (1.0 - a))
                        .collect()
                } else {
                    delta
                        .iter()
                        .zip(&pre[idx])
                        .map(|(d, z)| if *z > 0.0 { *d } else { 0.0 })
                        .collect()
                };

                let a_prev = &post[idx];
                let w_off = offsets[idx];
                let b_off = w_off + layer.weights.len();
                let mut d_prev = vec![0.0; layer.inputs];
                for o in 0..layer.outputs {
                    let g = dz[o];
                    if g == 0.0 {
                        continue;
                    }
                    grads[b_off + o] += g;
                    let row = o * layer.inputs;
                    for i in 0..layer.inputs {
                        grads[w_off + row + i] += g * a_prev[i];
                        d_prev[i] += layer.weights[row + i] * g;
                    }
                }
                delta = d_prev;
            }
        }
        loss
    }

    /// Train on `windows` (each of length `window_size`, already scaled).
    /// Returns the mean batch loss of every epoch.
    pub fn train(&mut self, windows: &[Vec<f64>], schedule: &TrainSchedule) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(schedule.seed);
        let mut optimizer = AdamOptimizer::new(self.weights.num_params(), schedule.learning_rate);
        let mut order: Vec<usize> = (0..windows.len()).collect();
        let batch_size = schedule.batch_size.max(1);
        let mut epoch_losses = Vec::with_capacity(schedule.epochs);

        for _ in 0..schedule.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            let mut batches = 0usize;

            for chunk in order.chunks(batch_size) {
                let batch: Vec<&[f64]> = chunk.iter().map(|i| windows[*i].as_slice()).collect();
                let mut grads = vec![0.0; self.weights.num_params()];
                epoch_loss += self.backprop(&batch, &mut grads);
                optimizer.apply(self.weights.params_mut(), &grads);
                batches += 1;
            }

            epoch_losses.push(if batches > 0 { epoch_loss / batches as f64 } else { 0.0 });
        }
        epoch_losses
    }
}
