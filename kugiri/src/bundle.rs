//! 学習済みモデル一式を管理するモジュール
//!
//! このモジュールは、解析に必要なすべての学習済み成果物（境界判定モデル、
//! レベルごとのタグ付与モデル、語彙辞書、部分語辞書、素性ID対応表、
//! 学習時の設定）を単一の所有構造体として保持し、その永続化を提供します。
//!
//! モデル一式は学習時にのみ構築・変更され、読み込み後は不変です。
//! 並行解析では`Arc`で共有してください（読み込み後に公開する方式であり、
//! 使用中のモデル一式をその場で書き換えることはありません）。

use std::io::{Read, Write};

use bincode::{Decode, Encode};

use crate::common;
use crate::dictionary::Dictionary;
use crate::errors::{KugiriError, Result};
use crate::feature_lookup::FeatureLookup;
use crate::lm::CharLm;
use crate::model::LinearModel;

/// モデルファイルを識別するマジックバイト。
///
/// この定数の"0.1"はモデルフォーマットのバージョンを示しており、
/// クレートのセマンティックバージョンからは切り離されています。
pub const MODEL_MAGIC: &[u8] = b"KugiriAnalyzer 0.1\n";

/// 解析とモデル学習の設定
///
/// n-gramの次数と窓幅、タグ付与レベル数、未知語処理のパラメータを
/// 保持します。学習時に固定され、モデルと共に保存されて推論時に
/// そのまま使用されます。
#[derive(Debug, Clone, Decode, Encode)]
pub struct ModelConfig {
    /// 文字n-gramの最大次数
    pub char_n: u8,

    /// 境界判定点の両側で参照する文字数
    pub char_window: u8,

    /// 文字種n-gramの最大次数
    pub type_n: u8,

    /// 境界判定点の両側で参照する文字種の数
    pub type_window: u8,

    /// 辞書一致長バケットの上限
    pub dict_n: u8,

    /// タグ付与レベル数
    pub n_levels: u8,

    /// 未知語候補生成のビーム幅
    pub unk_beam_size: u16,

    /// 未知語候補として保持するタグ数の上限
    pub unk_max_tags: u8,

    /// 部分語辞書に登録する表層形の最大文字数
    pub unk_subword_len: u8,

    /// 未知語言語モデルのn-gram次数（1以上）
    pub unk_lm_order: u8,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            char_n: 3,
            char_window: 3,
            type_n: 3,
            type_window: 3,
            dict_n: 4,
            n_levels: 1,
            unk_beam_size: 50,
            unk_max_tags: 3,
            unk_subword_len: 3,
            unk_lm_order: 3,
        }
    }
}

/// 素性ID対応表と線形モデルの組
///
/// 1つの判定（境界、局所タグ、大域タグ）を担う採点単位です。
/// 対応表は学習時に凍結され、推論では未知の素性が省かれます。
#[derive(Debug, Clone, Default, Decode, Encode)]
pub struct ScoredModel {
    /// 素性ID対応表
    pub features: FeatureLookup,

    /// 線形モデル
    pub model: LinearModel,
}

/// 1つのタグ付与レベルのモデル一式
///
/// レベルごとに独立した局所モデル、大域モデル、タグ語彙、
/// 未知語言語モデルを保持します。
#[derive(Debug, Clone, Decode, Encode)]
pub struct LevelModels {
    /// 単語内の文字文脈でタグを採点する局所モデル
    pub local: ScoredModel,

    /// 単語全体の素性でタグを再採点する大域モデル
    pub global: Option<ScoredModel>,

    /// 学習時に記録されたこのレベルの閉じたタグ語彙
    pub global_tags: Vec<String>,

    /// 未知語候補の順位付けに使用する文字言語モデル
    pub unk_lm: CharLm,
}

/// 学習済みモデル一式
///
/// 境界判定モデル、レベルごとのタグ付与モデル、語彙辞書、部分語辞書、
/// 学習時の設定を所有します。推論時は読み取り専用であり、
/// 独立した文の並行解析は完全に並列実行できます。
pub struct ModelBundle {
    /// 学習時に固定された設定
    pub config: ModelConfig,

    /// 語彙辞書
    pub dict: Dictionary,

    /// 部分語辞書
    pub subword_dict: Dictionary,

    /// 単語境界判定モデル
    pub ws: ScoredModel,

    /// タグ付与レベルごとのモデル一式
    pub levels: Vec<LevelModels>,
}

impl ModelBundle {
    /// モデル一式をライターにシリアライズします。
    ///
    /// 出力はマジックバイトに続くbincodeエンコードされた本体です。
    /// [`ModelBundle::read`]で読み戻した結果は、同一の素性ベクトルに対して
    /// 同一のスコアを再現します。
    ///
    /// # 引数
    ///
    /// * `wtr` - 書き込み先
    ///
    /// # エラー
    ///
    /// 書き込みまたはエンコードに失敗した場合、エラーを返します。
    pub fn write<W>(&self, mut wtr: W) -> Result<()>
    where
        W: Write,
    {
        wtr.write_all(MODEL_MAGIC)?;
        let config = common::bincode_config();
        bincode::encode_into_std_write(&self.config, &mut wtr, config)?;
        bincode::encode_into_std_write(&self.dict, &mut wtr, config)?;
        bincode::encode_into_std_write(&self.subword_dict, &mut wtr, config)?;
        bincode::encode_into_std_write(&self.ws, &mut wtr, config)?;
        bincode::encode_into_std_write(&self.levels, &mut wtr, config)?;
        Ok(())
    }

    /// リーダーからモデル一式をデシリアライズします。
    ///
    /// 入力は[`ModelBundle::write`]がエクスポートしたバイト列で
    /// なければなりません。ファイルが途中で切れている場合や
    /// 互換性のない形式の場合は、部分的な状態を残さずにエラーを返します。
    ///
    /// # 引数
    ///
    /// * `rdr` - モデルデータを読み込むリーダー
    ///
    /// # 戻り値
    ///
    /// 読み込まれたモデル一式
    ///
    /// # エラー
    ///
    /// マジックバイトが一致しない場合、またはデコードに失敗した場合、
    /// エラーを返します。
    pub fn read<R>(mut rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let mut magic = [0; MODEL_MAGIC.len()];
        rdr.read_exact(&mut magic)?;
        if magic != MODEL_MAGIC {
            return Err(KugiriError::invalid_format(
                "rdr",
                "The magic number of the input model mismatches.",
            ));
        }
        let config = common::bincode_config();
        let model_config: ModelConfig = bincode::decode_from_std_read(&mut rdr, config)?;
        let dict: Dictionary = bincode::decode_from_std_read(&mut rdr, config)?;
        let subword_dict: Dictionary = bincode::decode_from_std_read(&mut rdr, config)?;
        let ws: ScoredModel = bincode::decode_from_std_read(&mut rdr, config)?;
        let levels: Vec<LevelModels> = bincode::decode_from_std_read(&mut rdr, config)?;

        if usize::from(model_config.n_levels) != levels.len() {
            return Err(KugiriError::invalid_format(
                "rdr",
                "The number of tagging levels mismatches the configuration.",
            ));
        }

        Ok(Self {
            config: model_config,
            dict,
            subword_dict,
            ws,
            levels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::dictionary::{Entry, WordEntry};
    use crate::feature_lookup::FeatureKey;

    fn build_test_bundle() -> ModelBundle {
        let dict = Dictionary::from_entries(vec![(
            "cat".to_string(),
            Entry::Word(WordEntry {
                level_tags: vec![vec![("K AE T".to_string(), 5.0)]],
                source_mask: 1,
            }),
        )])
        .unwrap();

        let mut ws = ScoredModel::default();
        ws.features.id_of(&FeatureKey::CharNgram {
            offset: 0,
            ngram: "c".to_string(),
        });

        let mut unk_lm = CharLm::new(2);
        unk_lm.add_sequence("K AE T");

        ModelBundle {
            config: ModelConfig::default(),
            dict,
            subword_dict: Dictionary::from_entries(vec![]).unwrap(),
            ws,
            levels: vec![LevelModels {
                local: ScoredModel::default(),
                global: None,
                global_tags: vec!["K AE T".to_string()],
                unk_lm,
            }],
        }
    }

    #[test]
    fn test_round_trip() {
        let bundle = build_test_bundle();
        let mut buf = vec![];
        bundle.write(&mut buf).unwrap();
        let reloaded = ModelBundle::read(buf.as_slice()).unwrap();

        // 辞書・素性ID・語彙が同一に再現されること。
        let key: Vec<char> = "cat".chars().collect();
        let entry = reloaded.dict.exact_match(&key).unwrap();
        assert_eq!(entry.tags(0), &[("K AE T".to_string(), 5.0)]);
        assert_eq!(
            reloaded.ws.features.get(&FeatureKey::CharNgram {
                offset: 0,
                ngram: "c".to_string(),
            }),
            bundle.ws.features.get(&FeatureKey::CharNgram {
                offset: 0,
                ngram: "c".to_string(),
            }),
        );
        assert_eq!(reloaded.levels[0].global_tags, bundle.levels[0].global_tags);

        // 言語モデルのスコアが同一であること。
        let seq: Vec<char> = "K AE".chars().collect();
        assert_eq!(
            reloaded.levels[0].unk_lm.score(&seq),
            bundle.levels[0].unk_lm.score(&seq),
        );
    }

    #[test]
    fn test_magic_mismatch() {
        let mut buf = vec![];
        build_test_bundle().write(&mut buf).unwrap();
        buf[0] ^= 0xFF;
        assert!(ModelBundle::read(buf.as_slice()).is_err());
    }

    #[test]
    fn test_truncated_input() {
        let mut buf = vec![];
        build_test_bundle().write(&mut buf).unwrap();
        buf.truncate(buf.len() / 2);
        assert!(ModelBundle::read(buf.as_slice()).is_err());
    }
}
