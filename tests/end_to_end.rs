use anyhow::Result;
use byte_transformer::layers::ForwardContext;
use byte_transformer::tokenizer::{BOS_ID, EOS_ID, PAD_ID};
use byte_transformer::{
    batch_ids, ByteTokenizer, TokenizerConfig, TransformerEncDec, TransformerEncDecConfig,
    TransformerLM, TransformerLMConfig,
};
use candle_core::{DType, Device, IndexOp, Tensor, D};
use candle_nn::{VarBuilder, VarMap};

fn lm(varmap: &VarMap, vocab_size: usize) -> Result<TransformerLM> {
    let mut config = TransformerLMConfig::new(vocab_size, 32);
    config.depth = 2;
    config.heads = 4;
    config.pad_idx = Some(PAD_ID);
    config.tie_weights = true;
    let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
    Ok(TransformerLM::new(config, vb)?)
}

#[test]
fn batch_ids_pads_to_longest_text() -> Result<()> {
    let tokenizer = ByteTokenizer::new(TokenizerConfig::new(true, true));
    let ids = batch_ids(&tokenizer, &["abc", "a"], &Device::Cpu)?;
    assert_eq!(ids.dims(), &[2, 5]);
    assert_eq!(
        ids.to_vec2::<u32>()?,
        vec![
            vec![BOS_ID, 100, 101, 102, EOS_ID],
            vec![BOS_ID, 100, EOS_ID, PAD_ID, PAD_ID],
        ]
    );
    assert!(batch_ids::<&str>(&tokenizer, &[], &Device::Cpu).is_err());
    assert!(batch_ids(&ByteTokenizer::default(), &["", ""], &Device::Cpu).is_err());
    Ok(())
}

#[test]
fn text_to_logits_and_back() -> Result<()> {
    let tokenizer = ByteTokenizer::default();
    let varmap = VarMap::new();
    let model = lm(&varmap, tokenizer.vocab_size())?;

    let ids = batch_ids(&tokenizer, &["hello"], &Device::Cpu)?;
    let logits = model.forward(&ids, None, &mut ForwardContext::eval())?;
    assert_eq!(logits.dims(), &[1, 5, 259]);

    let predicted: Vec<u32> = logits.argmax(D::Minus1)?.i(0)?.to_vec1()?;
    assert!(predicted.iter().all(|id| (*id as usize) < tokenizer.vocab_size()));
    // Any predicted id decodes, reserved ones included.
    tokenizer.decode(&predicted)?;

    let roundtrip: Vec<u32> = ids.i(0)?.to_vec1()?;
    assert_eq!(tokenizer.decode(&roundtrip)?, "hello");
    Ok(())
}

#[test]
fn padded_rows_match_unpadded_prefix() -> Result<()> {
    let tokenizer = ByteTokenizer::default();
    let varmap = VarMap::new();
    let model = lm(&varmap, tokenizer.vocab_size())?;
    let mut ctx = ForwardContext::eval();

    let batch = batch_ids(&tokenizer, &["transformer", "byte"], &Device::Cpu)?;
    let batched = model.forward(&batch, None, &mut ctx)?;
    let alone = model.forward(&batch_ids(&tokenizer, &["byte"], &Device::Cpu)?, None, &mut ctx)?;

    let diff = batched
        .i((1, 0..4))?
        .sub(&alone.i(0)?)?
        .abs()?
        .max_all()?
        .to_vec0::<f32>()?;
    assert!(diff < 1e-4, "max diff {diff}");
    Ok(())
}

#[test]
fn encoder_decoder_over_byte_vocabulary() -> Result<()> {
    let tokenizer = ByteTokenizer::new(TokenizerConfig::new(true, true));
    let vocab = tokenizer.vocab_size();
    let mut config = TransformerEncDecConfig::new(vocab, vocab, 32);
    config.depth = 1;
    config.heads = 4;
    config.pad_idx = Some(PAD_ID);
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = TransformerEncDec::new(config, vb)?;

    let src = batch_ids(&tokenizer, &["source text", "src"], &Device::Cpu)?;
    let tgt = batch_ids(&tokenizer, &["target", "tgt"], &Device::Cpu)?;
    let logits = model.forward(&src, &tgt, None, None, &mut ForwardContext::eval())?;
    assert_eq!(logits.dims(), &[2, 8, vocab]);

    let src_mask = model.padding_mask(&src)?.expect("pad_idx is set");
    let expected = src.ne(&Tensor::zeros_like(&src)?)?;
    assert_eq!(src_mask.to_vec2::<u8>()?, expected.to_vec2::<u8>()?);
    Ok(())
}
