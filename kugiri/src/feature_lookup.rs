//! 素性IDの対応表を提供するモジュール
//!
//! このモジュールは、構造化された素性の記述（n-gram、辞書一致、表層形など）を
//! 安定した整数IDへ対応付ける対応表を提供します。IDは学習時に初出順で
//! 割り当てられ、モデルと共に保存されて推論時にそのまま再利用されます。
//! 学習と推論の間で素性IDがずれると採点が静かに壊れるため、対応表は
//! モデルの一部として凍結されます。
//!
//! 推論時に未知の素性が現れることは異常ではありません。対応表は
//! [`FeatureLookup::get`] で `None` を返し、その素性は素性ベクトルから
//! 単に省かれます。

use std::collections::HashMap;

use bincode::{Decode, Encode};

/// 辞書一致素性における境界と一致範囲の位置関係
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Decode, Encode)]
pub enum DictPosition {
    /// 一致範囲が境界の直後から始まる
    Left,

    /// 境界が一致範囲の内部にある
    Inside,

    /// 一致範囲が境界の直前で終わる
    Right,
}

/// 素性の構造化された記述
///
/// 素性は (種類, ペイロード) で構成されます。種類がキーの一部であるため、
/// 異なる種類の素性が同じIDに衝突することはありません。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Decode, Encode)]
pub enum FeatureKey {
    /// 指定オフセットの文字n-gram
    CharNgram {
        /// 判定点からの相対位置（文字単位）
        offset: i16,
        /// n-gram文字列
        ngram: String,
    },

    /// 指定オフセットの文字種n-gram
    TypeNgram {
        /// 判定点からの相対位置（文字単位）
        offset: i16,
        /// 文字種記号のn-gram文字列
        ngram: String,
    },

    /// 境界判定における辞書一致素性
    ///
    /// 一致長のバケットとソース辞書ID、境界との位置関係を符号化します。
    DictWord {
        /// 境界と一致範囲の位置関係
        position: DictPosition,
        /// 一致長のバケット（設定された上限で飽和）
        length: u8,
        /// ソース辞書のビット番号
        source: u8,
    },

    /// ソース辞書における表層形の収録有無
    DictSource {
        /// ソース辞書のビット番号
        source: u8,
    },

    /// 単語の表層形そのもの
    SelfSurface(String),

    /// 単語表層形の内部n-gram
    SelfNgram {
        /// 単語先頭からの相対位置（文字単位）
        offset: i16,
        /// n-gram文字列
        ngram: String,
    },

    /// 文脈タグ素性
    ///
    /// 既に選択された近傍単語のタグを文脈として符号化します。
    TagContext {
        /// 単語単位の相対位置
        offset: i8,
        /// 近傍単語のタグ
        tag: String,
    },
}

/// 素性記述から素性IDへの対応表
///
/// 同一の記述は1つのモデル内で常に同じIDへ対応します。
#[derive(Debug, Clone, Default, Decode, Encode)]
pub struct FeatureLookup {
    ids: HashMap<FeatureKey, u32>,
}

impl FeatureLookup {
    /// 新しい空の対応表を作成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// 素性記述のIDを返します。未登録の場合は新しいIDを割り当てます。
    ///
    /// 学習時にのみ使用します。
    ///
    /// # 引数
    ///
    /// * `key` - 素性記述
    ///
    /// # 戻り値
    ///
    /// 素性ID
    pub fn id_of(&mut self, key: &FeatureKey) -> u32 {
        if let Some(&id) = self.ids.get(key) {
            id
        } else {
            let id = u32::try_from(self.ids.len()).unwrap();
            self.ids.insert(key.clone(), id);
            id
        }
    }

    /// 登録済みの素性記述のIDを返します。
    ///
    /// 推論時に使用します。未登録の素性は`None`となり、素性ベクトルから
    /// 省かれます。
    ///
    /// # 引数
    ///
    /// * `key` - 素性記述
    #[inline(always)]
    pub fn get(&self, key: &FeatureKey) -> Option<u32> {
        self.ids.get(key).copied()
    }

    /// 登録済みの素性数を返します。
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// 対応表が空かどうかを返します。
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
