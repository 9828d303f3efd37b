//! 線形採点モデルのモジュール
//!
//! このモジュールは、疎な素性ID集合から実数スコアを計算する線形モデルを
//! 提供します。学習は`train`フィーチャーが有効な場合のみ利用可能で、
//! liblinearによって行われます。学習後は重みが取り出されて本構造体に
//! 保持されるため、推論はliblinearに依存しません。

use bincode::{Decode, Encode};

#[cfg(feature = "train")]
use liblinear::LibLinearModel;

#[cfg(feature = "train")]
use crate::errors::{KugiriError, Result};

/// 線形採点モデル
///
/// ラベルごとの重みベクトルとバイアスを保持します。
/// 2値判定（単語境界）ではラベル0が「境界なし」、ラベル1が「境界あり」に
/// 対応し、多値判定（タグ選択）ではラベルがタグ語彙の添字に対応します。
#[derive(Debug, Clone, Default, Decode, Encode)]
pub struct LinearModel {
    // weights[label][feature_id]
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl LinearModel {
    /// すべてのスコアが0となる自明なモデルを作成します。
    ///
    /// ラベル数が1以下で学習が成立しない場合に使用されます。
    pub(crate) fn trivial(n_labels: usize) -> Self {
        Self {
            weights: vec![vec![]; n_labels],
            bias: vec![0.0; n_labels],
        }
    }

    /// 重みベクトルとバイアスからモデルを構築します。テスト専用です。
    #[cfg(test)]
    pub(crate) fn from_weights(weights: Vec<Vec<f64>>, bias: Vec<f64>) -> Self {
        assert_eq!(weights.len(), bias.len());
        Self { weights, bias }
    }

    /// ラベル数を返します。
    #[inline(always)]
    pub fn num_labels(&self) -> usize {
        self.weights.len()
    }

    /// 指定されたラベルのスコアを計算します。
    ///
    /// # 引数
    ///
    /// * `label` - ラベル番号
    /// * `features` - 素性IDの集合
    ///
    /// # 戻り値
    ///
    /// 線形スコア（重みの総和とバイアス）
    pub fn score(&self, label: usize, features: &[u32]) -> f64 {
        let weights = &self.weights[label];
        let mut score = self.bias[label];
        for &fid in features {
            if let Some(w) = weights.get(fid as usize) {
                score += w;
            }
        }
        score
    }

    /// すべてのラベルのスコアを計算します。
    ///
    /// # 引数
    ///
    /// * `features` - 素性IDの集合
    ///
    /// # 戻り値
    ///
    /// ラベルごとのスコア
    pub fn scores(&self, features: &[u32]) -> Vec<f64> {
        (0..self.num_labels())
            .map(|label| self.score(label, features))
            .collect()
    }
}

/// 素性ベクトルとラベルの組から線形モデルを学習します。
///
/// L2正則化L2損失SVCを使用します。学習データに現れたラベルごとに
/// 重みベクトルが取り出され、[`LinearModel`]として返されます。
///
/// # 引数
///
/// * `examples` - (素性ID集合, ラベル) の組のリスト
/// * `n_labels` - ラベル数
/// * `n_features` - 素性数
/// * `cost` - 制約違反のコストパラメータC
/// * `epsilon` - 終了条件の許容誤差
///
/// # 戻り値
///
/// 学習済みの線形モデル
///
/// # エラー
///
/// liblinearが学習に失敗した場合、エラーを返します。
#[cfg(feature = "train")]
pub(crate) fn fit(
    examples: &[(Vec<u32>, usize)],
    n_labels: usize,
    n_features: usize,
    cost: f64,
    epsilon: f64,
) -> Result<LinearModel> {
    if n_labels < 2 || examples.is_empty() || n_features == 0 {
        return Ok(LinearModel::trivial(n_labels));
    }
    // 出現したラベルが1種類では分類問題が成立しない。
    let first_label = examples[0].1;
    if examples.iter().all(|(_, label)| *label == first_label) {
        return Ok(LinearModel::trivial(n_labels));
    }

    let mut xs = Vec::with_capacity(examples.len());
    let mut ys = Vec::with_capacity(examples.len());
    for (features, label) in examples {
        debug_assert!(*label < n_labels);
        let mut row: Vec<u32> = features.clone();
        row.sort_unstable();
        row.dedup();
        // liblinear expects 1-based feature indices.
        let row: Vec<(u32, f64)> = row.into_iter().map(|fid| (fid + 1, 1.0)).collect();
        xs.push(row);
        ys.push((*label + 1) as f64);
    }

    let mut builder = liblinear::Builder::new();
    let training_input = liblinear::util::TrainingInput::from_sparse_features(ys, xs)
        .map_err(|e| {
            KugiriError::invalid_state("liblinear input construction failed", format!("{e:?}"))
        })?;
    builder.problem().input_data(training_input).bias(1.0);
    builder
        .parameters()
        .solver_type(liblinear::SolverType::L2R_L2LOSS_SVC)
        .stopping_criterion(epsilon)
        .constraints_violation_cost(cost);
    let model = builder
        .build_model()
        .map_err(|e| KugiriError::invalid_state("liblinear training failed", e.to_string()))?;

    let mut weights = vec![vec![0.0; n_features]; n_labels];
    let mut bias = vec![0.0; n_labels];
    for label in 0..n_labels {
        let col = model
            .labels()
            .iter()
            .position(|&cls| cls == (label + 1) as i32);
        // Labels absent from the training data keep zero weights.
        let Some(col) = col else { continue };
        let col = col as i32;
        for fid in 0..n_features {
            weights[label][fid] = model.feature_coefficient(fid as i32 + 1, col);
        }
        bias[label] = model.label_bias(col);
    }

    Ok(LinearModel { weights, bias })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score() {
        let model = LinearModel {
            weights: vec![vec![0.0, 0.0, 0.0], vec![1.5, -0.5, 2.0]],
            bias: vec![0.0, -1.0],
        };
        assert_eq!(model.num_labels(), 2);
        assert!((model.score(1, &[0, 2]) - 2.5).abs() < 1e-9);
        assert!((model.score(0, &[0, 2])).abs() < 1e-9);
        // 範囲外の素性IDは無視される。
        assert!((model.score(1, &[0, 100]) - 0.5).abs() < 1e-9);
        let scores = model.scores(&[1]);
        assert!((scores[1] + 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_trivial() {
        let model = LinearModel::trivial(3);
        assert_eq!(model.scores(&[0, 1, 2]), vec![0.0, 0.0, 0.0]);
    }
}
