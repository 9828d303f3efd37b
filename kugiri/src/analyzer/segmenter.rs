//! 単語境界判定のモジュール
//!
//! このモジュールは、文の隣接する文字の間それぞれについて境界か否かを
//! 判定するための素性抽出と判定処理を提供します。長さLの文には L-1 個の
//! 境界候補点があり、各点は独立に採点されます（探索やバックトラックは
//! 行いません）。正のスコアは「境界あり」、0以下は「境界なし」です。

use crate::bundle::{ModelBundle, ModelConfig};
use crate::dictionary::Dictionary;
use crate::feature_lookup::{DictPosition, FeatureKey, FeatureLookup};
use crate::sentence::Sentence;

/// n-gram素性のテンプレート
///
/// 判定点に対する (相対位置, 次数) の組を事前計算したものです。
/// 境界判定とタグ付与の素性抽出で共有されます。
pub(crate) struct NgramTemplates {
    pub(crate) char_tpl: Vec<(i16, u8)>,
    pub(crate) type_tpl: Vec<(i16, u8)>,
}

impl NgramTemplates {
    /// 設定からテンプレートを構築します。
    ///
    /// 次数 `1..=n` のn-gramについて、窓幅 `w` の範囲
    /// （判定点の両側 `w` 文字）に収まるすべての相対位置を列挙します。
    pub(crate) fn from_config(config: &ModelConfig) -> Self {
        Self {
            char_tpl: Self::build(config.char_n, config.char_window),
            type_tpl: Self::build(config.type_n, config.type_window),
        }
    }

    fn build(max_n: u8, window: u8) -> Vec<(i16, u8)> {
        let mut tpl = vec![];
        let w = i16::from(window);
        for n in 1..=max_n {
            for offset in -w..=(w - i16::from(n)) {
                tpl.push((offset, n));
            }
        }
        tpl
    }
}

/// 素性IDの解決先
///
/// 学習時は未登録の素性に新しいIDを割り当て、推論時は登録済みの素性のみを
/// 解決します。推論時に未知の素性は素性ベクトルから省かれます。
pub(crate) enum FeatureSink<'a> {
    Train(&'a mut FeatureLookup),
    Infer(&'a FeatureLookup),
}

impl FeatureSink<'_> {
    /// 素性を解決し、IDを出力ベクトルに追加します。
    #[inline(always)]
    pub(crate) fn push(&mut self, key: FeatureKey, out: &mut Vec<u32>) {
        match self {
            Self::Train(lookup) => out.push(lookup.id_of(&key)),
            Self::Infer(lookup) => {
                if let Some(id) = lookup.get(&key) {
                    out.push(id);
                }
            }
        }
    }
}

/// 文のすべての境界候補点の素性ベクトルを抽出します。
///
/// 境界候補点 `b` は `chars[b]` と `chars[b+1]` の間を指します。
/// 各点について文字n-gram素性と文字種n-gram素性を抽出し、さらに
/// 文全体の辞書一致を走査して、一致範囲と境界の位置関係
/// （直前で終了・内部・直後から開始）を辞書素性として符号化します。
///
/// # 引数
///
/// * `sent` - 入力文
/// * `config` - モデル設定
/// * `tpl` - n-gramテンプレート
/// * `dict` - 語彙辞書
/// * `sink` - 素性IDの解決先
///
/// # 戻り値
///
/// 境界候補点ごとの素性ベクトル（長さ `len_char - 1`）
pub(crate) fn extract_boundary_features(
    sent: &Sentence,
    config: &ModelConfig,
    tpl: &NgramTemplates,
    dict: &Dictionary,
    sink: &mut FeatureSink,
) -> Vec<Vec<u32>> {
    let len = sent.len_char();
    if len < 2 {
        return vec![];
    }
    let chars = sent.chars();
    let mut features = vec![Vec::new(); len - 1];

    for (b, feats) in features.iter_mut().enumerate() {
        for &(offset, n) in &tpl.char_tpl {
            let Some(range) = ngram_range(b, offset, n, len) else {
                continue;
            };
            let ngram: String = chars[range].iter().collect();
            sink.push(FeatureKey::CharNgram { offset, ngram }, feats);
        }
        for &(offset, n) in &tpl.type_tpl {
            let Some(range) = ngram_range(b, offset, n, len) else {
                continue;
            };
            let ngram: String = range.map(|i| sent.char_type(i).tag_char()).collect();
            sink.push(FeatureKey::TypeNgram { offset, ngram }, feats);
        }
    }

    for start in 0..len {
        // Collected up front: the sink below needs exclusive access.
        let matches: Vec<(usize, u8)> = dict
            .common_prefix_iterator(&chars[start..])
            .map(|m| (start + m.end_char, m.entry.source_mask()))
            .collect();
        for (end, mask) in matches {
            let length = u8::try_from((end - start).min(usize::from(config.dict_n))).unwrap();
            for source in 0..8 {
                if mask & (1 << source) == 0 {
                    continue;
                }
                if start > 0 {
                    sink.push(
                        FeatureKey::DictWord {
                            position: DictPosition::Left,
                            length,
                            source,
                        },
                        &mut features[start - 1],
                    );
                }
                if end < len {
                    sink.push(
                        FeatureKey::DictWord {
                            position: DictPosition::Right,
                            length,
                            source,
                        },
                        &mut features[end - 1],
                    );
                }
                for b in start..end - 1 {
                    sink.push(
                        FeatureKey::DictWord {
                            position: DictPosition::Inside,
                            length,
                            source,
                        },
                        &mut features[b],
                    );
                }
            }
        }
    }

    features
}

/// 判定点 `b` に対する相対位置 `offset`・次数 `n` のn-gram範囲を返します。
///
/// 範囲が文からはみ出す場合は `None` を返します。
#[inline(always)]
fn ngram_range(
    b: usize,
    offset: i16,
    n: u8,
    len: usize,
) -> Option<std::ops::Range<usize>> {
    let start = isize::try_from(b).unwrap() + 1 + isize::from(offset);
    if start < 0 {
        return None;
    }
    let start = start as usize;
    let end = start + usize::from(n);
    if end > len {
        return None;
    }
    Some(start..end)
}

/// 文の単語境界を判定し、分割結果を文へ書き込みます。
///
/// 各境界候補点を独立に採点し、スコアが正の点のみを境界とします。
/// 既存の単語とタグは破棄されます。
pub(crate) fn segment(bundle: &ModelBundle, sent: &mut Sentence) {
    let tpl = NgramTemplates::from_config(&bundle.config);
    let features = extract_boundary_features(
        sent,
        &bundle.config,
        &tpl,
        &bundle.dict,
        &mut FeatureSink::Infer(&bundle.ws.features),
    );
    let boundaries = features
        .iter()
        .map(|feats| {
            if bundle.ws.model.num_labels() == 2 {
                let scores = bundle.ws.model.scores(feats);
                scores[1] - scores[0] > 0.0
            } else {
                false
            }
        })
        .collect();
    sent.set_boundaries(boundaries);
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::bundle::{LevelModels, ScoredModel};
    use crate::dictionary::{Entry, WordEntry};
    use crate::lm::CharLm;
    use crate::model::LinearModel;

    #[track_caller]
    fn build_dict(surfaces: &[&str]) -> Dictionary {
        Dictionary::from_entries(
            surfaces
                .iter()
                .map(|s| {
                    (
                        s.to_string(),
                        Entry::Word(WordEntry {
                            level_tags: vec![],
                            source_mask: 1,
                        }),
                    )
                })
                .collect(),
        )
        .unwrap()
    }

    fn empty_level() -> LevelModels {
        LevelModels {
            local: ScoredModel::default(),
            global: None,
            global_tags: vec![],
            unk_lm: CharLm::new(2),
        }
    }

    #[test]
    fn test_dictionary_word_is_not_split() {
        // 辞書一致長素性が支配的な境界モデルでは、辞書語 "ab" の内部は
        // 分割されず、その直後に境界が置かれる。
        let dict = build_dict(&["ab"]);
        let mut features = FeatureLookup::new();
        let right = features.id_of(&FeatureKey::DictWord {
            position: DictPosition::Right,
            length: 2,
            source: 0,
        });
        let inside = features.id_of(&FeatureKey::DictWord {
            position: DictPosition::Inside,
            length: 2,
            source: 0,
        });
        let mut weights = vec![vec![0.0; 2], vec![0.0; 2]];
        weights[1][right as usize] = 5.0;
        weights[1][inside as usize] = -5.0;
        let bundle = ModelBundle {
            config: ModelConfig::default(),
            dict,
            subword_dict: Dictionary::from_entries(vec![]).unwrap(),
            ws: ScoredModel {
                features,
                model: LinearModel::from_weights(weights, vec![0.0, 0.0]),
            },
            levels: vec![empty_level()],
        };

        let mut sent = Sentence::new();
        sent.set_sentence("abcd");
        segment(&bundle, &mut sent);

        assert_eq!(sent.boundaries(), &[false, true, false]);
        let words = sent.words();
        assert_eq!(words.len(), 2);
        assert_eq!(sent.surface(&words[0]), "ab");
        assert_eq!(sent.surface(&words[1]), "cd");
    }

    #[test]
    fn test_tie_means_merge() {
        // スコア0は「境界なし」として扱われる。
        let bundle = ModelBundle {
            config: ModelConfig::default(),
            dict: Dictionary::from_entries(vec![]).unwrap(),
            subword_dict: Dictionary::from_entries(vec![]).unwrap(),
            ws: ScoredModel {
                features: FeatureLookup::new(),
                model: LinearModel::trivial(2),
            },
            levels: vec![empty_level()],
        };
        let mut sent = Sentence::new();
        sent.set_sentence("abc");
        segment(&bundle, &mut sent);
        assert_eq!(sent.boundaries(), &[false, false]);
        assert_eq!(sent.words().len(), 1);
    }

    #[test]
    fn test_single_char_sentence() {
        let bundle = ModelBundle {
            config: ModelConfig::default(),
            dict: Dictionary::from_entries(vec![]).unwrap(),
            subword_dict: Dictionary::from_entries(vec![]).unwrap(),
            ws: ScoredModel::default(),
            levels: vec![empty_level()],
        };
        let mut sent = Sentence::new();
        sent.set_sentence("あ");
        segment(&bundle, &mut sent);
        assert!(sent.boundaries().is_empty());
        assert_eq!(sent.words().len(), 1);
    }

    #[test]
    fn test_ngram_feature_extraction() {
        // 学習モードでは各判定点の窓内n-gramがすべて登録される。
        let mut lookup = FeatureLookup::new();
        let mut sink = FeatureSink::Train(&mut lookup);
        let config = ModelConfig {
            char_n: 2,
            char_window: 2,
            type_n: 1,
            type_window: 1,
            ..Default::default()
        };
        let tpl = NgramTemplates::from_config(&config);
        let dict = Dictionary::from_entries(vec![]).unwrap();
        let mut sent = Sentence::new();
        sent.set_sentence("abc");
        let features =
            extract_boundary_features(&sent, &config, &tpl, &dict, &mut sink);
        assert_eq!(features.len(), 2);
        assert!(!features[0].is_empty());
        // 推論モードでは同じ文から同じID集合が得られる。
        let mut sink = FeatureSink::Infer(&lookup);
        let features2 =
            extract_boundary_features(&sent, &config, &tpl, &dict, &mut sink);
        assert_eq!(features, features2);
    }
}
