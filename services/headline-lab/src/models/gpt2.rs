//! GPT-2 causal language model on candle, with tied input/output embeddings.
//!
//! Weight names follow the Hugging Face `GPT2Model` checkpoint layout
//! (`wte`, `wpe`, `h.{i}.attn.c_attn`, ...); checkpoints saved from
//! `GPT2LMHeadModel` carry a `transformer.` prefix which is detected on load.
//! Projections are Conv1D style, weights stored as `[in, out]`.

use super::sampling::logits_processor;
use super::{HeadlineGenerator, SamplingParams};
use crate::error::InferenceError;
use candle_core::{DType, Device, IndexOp, Module, Tensor, D};
use candle_nn::{embedding, init, layer_norm, Embedding, LayerNorm, VarBuilder};
use serde::Deserialize;
use tokenizers::{PaddingParams, Tokenizer};

pub const EOS_TOKEN: &str = "<|endoftext|>";

#[derive(Debug, Clone, Deserialize)]
pub struct Gpt2Config {
    pub vocab_size: usize,
    pub n_positions: usize,
    pub n_embd: usize,
    pub n_layer: usize,
    pub n_head: usize,
    #[serde(default = "default_layer_norm_epsilon")]
    pub layer_norm_epsilon: f64,
    #[serde(default = "default_eos_token_id")]
    pub eos_token_id: u32,
    #[serde(default)]
    pub pad_token_id: Option<u32>,
}

fn default_layer_norm_epsilon() -> f64 { 1e-5 }
fn default_eos_token_id() -> u32 { 50256 }

struct Conv1D { weight: Tensor, bias: Tensor }

impl Conv1D {
    fn load(in_dim: usize, out_dim: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            weight: vb.get_with_hints((in_dim, out_dim), "weight", init::DEFAULT_KAIMING_NORMAL)?,
            bias: vb.get_with_hints(out_dim, "bias", init::ZERO)?,
        })
    }
}

impl Module for Conv1D {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        xs.broadcast_matmul(&self.weight)?.broadcast_add(&self.bias)
    }
}

struct Attention { c_attn: Conv1D, c_proj: Conv1D, n_head: usize, n_embd: usize }

impl Attention {
    fn load(cfg: &Gpt2Config, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            c_attn: Conv1D::load(cfg.n_embd, 3 * cfg.n_embd, vb.pp("c_attn"))?,
            c_proj: Conv1D::load(cfg.n_embd, cfg.n_embd, vb.pp("c_proj"))?,
            n_head: cfg.n_head,
            n_embd: cfg.n_embd,
        })
    }

    fn forward(&self, xs: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
        let (b, t, c) = xs.dims3()?;
        let head_dim = self.n_embd / self.n_head;
        let qkv = self.c_attn.forward(xs)?;
        let split = |i: usize| -> candle_core::Result<Tensor> {
            qkv.narrow(D::Minus1, i * c, c)?
                .reshape((b, t, self.n_head, head_dim))?
                .transpose(1, 2)?
                .contiguous()
        };
        let (q, k, v) = (split(0)?, split(1)?, split(2)?);
        let scale = 1.0 / (head_dim as f64).sqrt();
        let att = (q.matmul(&k.t()?)? * scale)?;
        let att = masked_fill(&att, &mask.broadcast_as(att.shape())?, f32::NEG_INFINITY)?;
        let att = candle_nn::ops::softmax_last_dim(&att)?;
        let ys = att.matmul(&v)?.transpose(1, 2)?.reshape((b, t, c))?;
        self.c_proj.forward(&ys)
    }
}

struct Mlp { c_fc: Conv1D, c_proj: Conv1D }

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.c_proj.forward(&self.c_fc.forward(xs)?.gelu()?)
    }
}

struct Block { ln_1: LayerNorm, attn: Attention, ln_2: LayerNorm, mlp: Mlp }

impl Block {
    fn load(cfg: &Gpt2Config, vb: VarBuilder) -> candle_core::Result<Self> {
        let inner = 4 * cfg.n_embd;
        Ok(Self {
            ln_1: layer_norm(cfg.n_embd, cfg.layer_norm_epsilon, vb.pp("ln_1"))?,
            attn: Attention::load(cfg, vb.pp("attn"))?,
            ln_2: layer_norm(cfg.n_embd, cfg.layer_norm_epsilon, vb.pp("ln_2"))?,
            mlp: Mlp {
                c_fc: Conv1D::load(cfg.n_embd, inner, vb.pp("mlp").pp("c_fc"))?,
                c_proj: Conv1D::load(inner, cfg.n_embd, vb.pp("mlp").pp("c_proj"))?,
            },
        })
    }

    fn forward(&self, xs: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
        let xs = (xs + self.attn.forward(&self.ln_1.forward(xs)?, mask)?)?;
        &xs + self.mlp.forward(&self.ln_2.forward(&xs)?)?
    }
}

pub struct Gpt2Model {
    wte: Embedding,
    wpe: Embedding,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
    cfg: Gpt2Config,
    device: Device,
}

impl Gpt2Model {
    pub fn load(vb: VarBuilder, cfg: &Gpt2Config) -> candle_core::Result<Self> {
        let vb = if vb.contains_tensor("transformer.wte.weight") { vb.pp("transformer") } else { vb };
        let blocks = (0..cfg.n_layer)
            .map(|i| Block::load(cfg, vb.pp(format!("h.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self {
            wte: embedding(cfg.vocab_size, cfg.n_embd, vb.pp("wte"))?,
            wpe: embedding(cfg.n_positions, cfg.n_embd, vb.pp("wpe"))?,
            blocks,
            ln_f: layer_norm(cfg.n_embd, cfg.layer_norm_epsilon, vb.pp("ln_f"))?,
            cfg: cfg.clone(),
            device: vb.device().clone(),
        })
    }

    /// Logits for the token following the last position of `ids`.
    pub fn next_token_logits(&self, ids: &[u32]) -> candle_core::Result<Tensor> {
        let t = ids.len();
        let input = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let positions = Tensor::arange(0u32, t as u32, &self.device)?;
        let mut xs = self.wte.forward(&input)?.broadcast_add(&self.wpe.forward(&positions)?)?;
        let mask = causal_mask(t, &self.device)?;
        for block in &self.blocks {
            xs = block.forward(&xs, &mask)?;
        }
        let last = self.ln_f.forward(&xs)?.i((.., t - 1, ..))?;
        let logits = last.matmul(&self.wte.embeddings().t()?)?;
        logits.squeeze(0)?.to_dtype(DType::F32)
    }
}

fn causal_mask(t: usize, device: &Device) -> candle_core::Result<Tensor> {
    let mask: Vec<u8> = (0..t).flat_map(|i| (0..t).map(move |j| u8::from(j > i))).collect();
    Tensor::from_slice(&mask, (t, t), device)
}

fn masked_fill(on_false: &Tensor, mask: &Tensor, on_true: f32) -> candle_core::Result<Tensor> {
    let on_true = Tensor::new(on_true, on_false.device())?.broadcast_as(mask.shape().dims())?;
    mask.where_cond(&on_true, on_false)
}

/// Tokenizer and model pair. The pad token is rebound to EOS in both so that
/// padding never produces an id the model has no embedding for.
pub struct Gpt2Generator {
    tokenizer: Tokenizer,
    model: Gpt2Model,
    eos_token_id: u32,
}

impl Gpt2Generator {
    pub fn new(mut tokenizer: Tokenizer, mut model: Gpt2Model) -> Self {
        let eos_token_id = tokenizer.token_to_id(EOS_TOKEN).unwrap_or(model.cfg.eos_token_id);
        tokenizer.with_padding(Some(PaddingParams {
            pad_id: eos_token_id,
            pad_token: EOS_TOKEN.to_string(),
            ..Default::default()
        }));
        model.cfg.pad_token_id = Some(eos_token_id);
        Self { tokenizer, model, eos_token_id }
    }

    pub fn eos_token_id(&self) -> u32 { self.eos_token_id }
    pub fn pad_token_id(&self) -> Option<u32> { self.model.cfg.pad_token_id }
}

impl HeadlineGenerator for Gpt2Generator {
    fn encode(&self, text: &str) -> Result<Vec<u32>, InferenceError> {
        let enc = self.tokenizer.encode(text, false).map_err(|e| InferenceError::Tokenize(e.to_string()))?;
        Ok(enc.get_ids().to_vec())
    }

    fn generate(&self, input_ids: &[u32], params: &SamplingParams) -> Result<Vec<Vec<u32>>, InferenceError> {
        if input_ids.is_empty() { return Err(InferenceError::Tokenize("prompt produced no tokens".into())); }
        let limit = params.max_length.min(self.model.cfg.n_positions);
        let mut sampler = logits_processor(params);
        let mut out = Vec::with_capacity(params.num_return_sequences);
        for _ in 0..params.num_return_sequences {
            let mut ids = input_ids.to_vec();
            while ids.len() < limit {
                let logits = self.model.next_token_logits(&ids)?;
                let next = sampler.sample(&logits).map_err(|e| InferenceError::Sampling(e.to_string()))?;
                ids.push(next);
                if next == self.eos_token_id { break; }
            }
            out.push(ids);
        }
        Ok(out)
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, InferenceError> {
        self.tokenizer.decode(ids, skip_special_tokens).map_err(|e| InferenceError::Decode(e.to_string()))
    }
}
