use super::*;
use candle_core::{Device, Result};

fn rows(mask: &Tensor) -> Result<Vec<Vec<u8>>> {
    mask.to_vec2::<u8>()
}

#[test]
fn causal_mask_respects_offsets() -> Result<()> {
    let device = Device::Cpu;
    let mask = build_causal_mask(&device, 3, 5)?;
    assert_eq!(mask.dims(), &[3, 5]);
    assert_eq!(mask.dtype(), MASK_DTYPE);

    // Earliest query sees the prefix plus itself (offset = k_len - q_len).
    assert_eq!(
        rows(&mask)?,
        vec![
            vec![1, 1, 1, 0, 0],
            vec![1, 1, 1, 1, 0],
            vec![1, 1, 1, 1, 1],
        ]
    );
    Ok(())
}

#[test]
fn causal_mask_square_is_lower_triangular() -> Result<()> {
    let device = Device::Cpu;
    let values = rows(&build_causal_mask(&device, 4, 4)?)?;
    for (q, row) in values.iter().enumerate() {
        for (k, &allowed) in row.iter().enumerate() {
            assert_eq!(allowed == 1, k <= q, "q={q} k={k}");
        }
    }
    Ok(())
}

#[test]
fn causal_mask_blocks_leading_rows_when_queries_outnumber_keys() -> Result<()> {
    let device = Device::Cpu;
    let values = rows(&build_causal_mask(&device, 4, 2)?)?;
    assert_eq!(values, vec![vec![0, 0], vec![0, 0], vec![1, 0], vec![1, 1]]);

    let values = rows(&build_causal_mask(&device, 1, 4)?)?;
    assert_eq!(values, vec![vec![1, 1, 1, 1]]);
    Ok(())
}

#[test]
fn padding_mask_from_ids_marks_non_pad() -> Result<()> {
    let device = Device::Cpu;
    let ids = Tensor::new(&[[5u32, 7, 0, 0], [0, 3, 4, 0]], &device)?;
    let mask = padding_mask_from_ids(&ids, 0)?;
    assert_eq!(mask.dtype(), MASK_DTYPE);
    assert_eq!(rows(&mask)?, vec![vec![1, 1, 0, 0], vec![0, 1, 1, 0]]);

    let ids = Tensor::new(&[[2i64, 9, 9]], &device)?;
    assert_eq!(rows(&padding_mask_from_ids(&ids, 9)?)?, vec![vec![1, 0, 0]]);
    Ok(())
}

#[test]
fn padding_mask_from_ids_rejects_float_ids() -> Result<()> {
    let device = Device::Cpu;
    let ids = Tensor::zeros((1, 3), DType::F32, &device)?;
    assert!(padding_mask_from_ids(&ids, 0).is_err());
    Ok(())
}

#[test]
fn padding_mask_from_ids_rejects_pad_outside_id_range() -> Result<()> {
    let device = Device::Cpu;
    let bytes = Tensor::new(&[[2u8, 7, 255]], &device)?;
    // 258 would wrap to 2 as a U8 and hide the first token.
    assert!(padding_mask_from_ids(&bytes, 258).is_err());
    assert_eq!(rows(&padding_mask_from_ids(&bytes, 255)?)?, vec![vec![1, 1, 0]]);

    let wide = Tensor::new(&[[2u32, 258]], &device)?;
    assert_eq!(rows(&padding_mask_from_ids(&wide, 258)?)?, vec![vec![1, 0]]);
    Ok(())
}

#[test]
fn padding_mask_from_lengths_masks_tail() -> Result<()> {
    let device = Device::Cpu;
    let mask = padding_mask_from_lengths(&device, &[2, 7], 5)?;
    assert_eq!(
        rows(&mask)?,
        vec![vec![1, 1, 0, 0, 0], vec![1, 1, 1, 1, 1]]
    );
    Ok(())
}

#[test]
fn combine_masks_is_outer_product() -> Result<()> {
    let device = Device::Cpu;
    let query = Tensor::new(&[[1u8, 1, 0]], &device)?;
    let key = Tensor::new(&[[1u8, 0]], &device)?;
    let combined = combine_masks(Some(&query), Some(&key), 1, 3, 2, &device)
        .unwrap()
        .unwrap();
    assert_eq!(combined.dims(), &[1, 1, 3, 2]);
    assert_eq!(
        combined.squeeze(0)?.squeeze(0)?.to_vec2::<u8>()?,
        vec![vec![1, 0], vec![1, 0], vec![0, 0]]
    );
    Ok(())
}

#[test]
fn combine_masks_defaults_missing_side_to_true() -> Result<()> {
    let device = Device::Cpu;
    assert!(combine_masks(None, None, 1, 2, 2, &device).unwrap().is_none());

    let key = Tensor::new(&[[0u8, 1, 1]], &device)?;
    let combined = combine_masks(None, Some(&key), 1, 2, 3, &device)
        .unwrap()
        .unwrap();
    assert_eq!(
        combined.squeeze(0)?.squeeze(0)?.to_vec2::<u8>()?,
        vec![vec![0, 1, 1], vec![0, 1, 1]]
    );
    Ok(())
}

#[test]
fn combine_masks_rejects_wrong_length() -> Result<()> {
    let device = Device::Cpu;
    let query = Tensor::ones((2, 4), MASK_DTYPE, &device)?;
    let err = combine_masks(Some(&query), None, 2, 3, 3, &device).unwrap_err();
    assert!(matches!(err, AttentionError::InvalidShape { .. }));

    let float_mask = Tensor::ones((2, 3), DType::F32, &device)?;
    let err = combine_masks(Some(&float_mask), None, 2, 3, 3, &device).unwrap_err();
    assert!(matches!(err, AttentionError::UnsupportedDType { .. }));
    Ok(())
}

#[test]
fn apply_mask_fills_blocked_scores() -> Result<()> {
    let device = Device::Cpu;
    let scores = Tensor::new(&[[[[0.5f32, 1.5], [2.0, -1.0]]]], &device)?;
    let mask = Tensor::new(&[[1u8, 0], [1, 1]], &device)?;
    let masked = apply_mask(&scores, &mask).unwrap();
    assert_eq!(
        masked.squeeze(0)?.squeeze(0)?.to_vec2::<f32>()?,
        vec![vec![0.5, MASK_VALUE], vec![2.0, -1.0]]
    );
    Ok(())
}
