//! 文字n-gram言語モデルのモジュール
//!
//! このモジュールは、タグ文字列（読みなど）の尤もらしさを評価するための
//! 文字n-gram言語モデルを提供します。未知語のタグ候補生成において、
//! 部分語の敷き詰めで得られた候補タグ列の順位付けに使用されます。
//!
//! 平滑化にはWitten-Bell法を使用します。文脈ごとの継続文字の異なり数を
//! 補間係数とし、未知の文脈では短い文脈へ逐次バックオフします。

use std::collections::HashMap;

use bincode::{Decode, Encode};

/// 文脈ごとの継続文字の統計
#[derive(Debug, Clone, Default, Decode, Encode)]
struct ContextStats {
    total: u32,
    counts: HashMap<char, u32>,
}

/// 文字n-gram言語モデル
///
/// 候補文字列に対する対数尤度を計算します。学習後は読み取り専用です。
#[derive(Debug, Clone, Default, Decode, Encode)]
pub struct CharLm {
    order: u8,

    // 文脈文字列（長さ 0..order-1）から継続文字の統計への対応。
    contexts: HashMap<String, ContextStats>,

    // 学習データに現れた文字の異なり数。未知文字の基底確率に使用。
    vocab_size: u32,
}

impl CharLm {
    /// 指定された次数の空のモデルを作成します。
    ///
    /// # 引数
    ///
    /// * `order` - n-gramの次数（1以上）
    pub fn new(order: u8) -> Self {
        assert!(order >= 1);
        Self {
            order,
            contexts: HashMap::new(),
            vocab_size: 0,
        }
    }

    /// n-gramの次数を返します。
    #[inline(always)]
    pub fn order(&self) -> u8 {
        self.order
    }

    /// 学習データに1つの文字列を追加します。
    ///
    /// 文字列内の各位置について、長さ 0 から `order - 1` までの
    /// すべての文脈で継続文字の出現を数えます。
    ///
    /// # 引数
    ///
    /// * `seq` - 学習する文字列
    pub fn add_sequence(&mut self, seq: &str) {
        let chars: Vec<char> = seq.chars().collect();
        let mut seen = 0;
        for (i, &c) in chars.iter().enumerate() {
            let max_ctx = usize::from(self.order - 1).min(i);
            for n in 0..=max_ctx {
                let ctx: String = chars[i - n..i].iter().collect();
                let stats = self.contexts.entry(ctx).or_default();
                stats.total += 1;
                let count = stats.counts.entry(c).or_insert(0);
                if *count == 0 && n == 0 {
                    seen += 1;
                }
                *count += 1;
            }
        }
        self.vocab_size += seen;
    }

    /// 文字列の対数尤度を計算します。
    ///
    /// 各文字について、利用可能な最長の文脈から始めてWitten-Bell補間で
    /// 短い文脈へバックオフしながら確率を計算し、自然対数の総和を
    /// 返します。
    ///
    /// # 引数
    ///
    /// * `seq` - 評価する文字列
    ///
    /// # 戻り値
    ///
    /// 対数尤度。未知の文字を含む場合も有限の値を返します。
    pub fn score(&self, seq: &[char]) -> f64 {
        let mut total = 0.0;
        for (i, &c) in seq.iter().enumerate() {
            let max_ctx = usize::from(self.order - 1).min(i);
            total += self.prob(&seq[i - max_ctx..i], c).ln();
        }
        total
    }

    /// Witten-Bell補間による継続確率を計算します。
    fn prob(&self, ctx: &[char], c: char) -> f64 {
        // 語彙に1を加え、未知文字にも確率の質量を残す。
        let base = 1.0 / f64::from(self.vocab_size + 1);
        if ctx.is_empty() {
            return match self.contexts.get("") {
                Some(stats) => {
                    let types = stats.counts.len() as f64;
                    let total = f64::from(stats.total);
                    let count = f64::from(stats.counts.get(&c).copied().unwrap_or(0));
                    (count + types * base) / (total + types)
                }
                None => base,
            };
        }
        let key: String = ctx.iter().collect();
        match self.contexts.get(&key) {
            Some(stats) => {
                let types = stats.counts.len() as f64;
                let total = f64::from(stats.total);
                let count = f64::from(stats.counts.get(&c).copied().unwrap_or(0));
                let backoff = self.prob(&ctx[1..], c);
                (count + types * backoff) / (total + types)
            }
            None => self.prob(&ctx[1..], c),
        }
    }
}
