//! Joint ascending sort of scores and ids.

use crate::error::{IndexError, Result};
use crate::VectorId;

/// Scores paired with ids, either one flat list or one list per query.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoredIds {
    Flat {
        scores: Vec<f32>,
        ids: Vec<VectorId>,
    },
    Batch {
        scores: Vec<Vec<f32>>,
        ids: Vec<Vec<VectorId>>,
    },
}

/// Sort scores ascending, carrying ids along. The output has the input's shape.
///
/// Every batch row is sorted independently. Equal scores keep their input
/// order, and rows that are already ascending are returned untouched.
pub fn joint_sort(input: ScoredIds) -> Result<ScoredIds> {
    match input {
        ScoredIds::Flat { scores, ids } => {
            let (scores, ids) = sort_row(scores, ids)?;
            Ok(ScoredIds::Flat { scores, ids })
        }
        ScoredIds::Batch { scores, ids } => {
            if scores.len() != ids.len() {
                return Err(IndexError::LengthMismatch {
                    left: scores.len(),
                    right: ids.len(),
                });
            }
            let mut out_scores = Vec::with_capacity(scores.len());
            let mut out_ids = Vec::with_capacity(ids.len());
            for (s, i) in scores.into_iter().zip(ids) {
                let (s, i) = sort_row(s, i)?;
                out_scores.push(s);
                out_ids.push(i);
            }
            Ok(ScoredIds::Batch {
                scores: out_scores,
                ids: out_ids,
            })
        }
    }
}

/// True if `scores` is non-decreasing under `f32::total_cmp`.
pub fn is_ascending(scores: &[f32]) -> bool {
    scores.windows(2).all(|w| w[0].total_cmp(&w[1]).is_le())
}

fn sort_row(scores: Vec<f32>, ids: Vec<VectorId>) -> Result<(Vec<f32>, Vec<VectorId>)> {
    if scores.len() != ids.len() {
        return Err(IndexError::LengthMismatch {
            left: scores.len(),
            right: ids.len(),
        });
    }
    if is_ascending(&scores) {
        return Ok((scores, ids));
    }

    let mut pairs: Vec<(f32, VectorId)> = scores.into_iter().zip(ids).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(pairs.into_iter().unzip())
}
