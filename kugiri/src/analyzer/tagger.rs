//! タグ候補生成とタグ選択のモジュール
//!
//! このモジュールは、分割された単語に対するタグ候補の生成と、
//! 局所・大域モデルによる候補の採点を提供します。
//!
//! 候補生成には2つの経路があります:
//!
//! - 既知語経路: 語彙辞書の完全一致から、そのレベルに記録された
//!   タグをそれぞれ候補とします。辞書の重みから導いた対数確率が
//!   事前スコアとなります。
//! - 未知語経路: 部分語辞書の一致で単語を敷き詰め、タグ断片を連結した
//!   候補列を文字言語モデルで採点するビーム探索です。探索幅が
//!   有界であるため、単語あたりの処理時間は辞書の規模によらず
//!   抑えられます。
//!
//! あるレベルで候補が1つも得られない場合、その単語はそのレベルで
//! タグなしのまま残され、解析は継続します。

use std::ops::Range;

use hashbrown::{HashMap, HashSet};

use crate::analyzer::segmenter::{FeatureSink, NgramTemplates};
use crate::bundle::ModelBundle;
use crate::dictionary::Dictionary;
use crate::feature_lookup::FeatureKey;
use crate::lm::CharLm;
use crate::sentence::{Sentence, Tag};

/// 単語の文脈から局所タグ素性を抽出します。
///
/// 単語の左右の文脈に対する文字n-gram・文字種n-gram素性（単語の
/// 開始・終了位置からの相対位置付き）と、直前の単語で既に選択された
/// タグの文脈素性を抽出します。
pub(crate) fn local_features(
    sent: &Sentence,
    range: &Range<usize>,
    tpl: &NgramTemplates,
    prev_tag: Option<&str>,
    sink: &mut FeatureSink,
) -> Vec<u32> {
    let chars = sent.chars();
    let len = chars.len();
    let mut feats = vec![];

    for &(offset, n) in &tpl.char_tpl {
        let Some(ngram_range) = context_range(range, offset, n, len) else {
            continue;
        };
        let ngram: String = chars[ngram_range].iter().collect();
        sink.push(FeatureKey::CharNgram { offset, ngram }, &mut feats);
    }
    for &(offset, n) in &tpl.type_tpl {
        let Some(ngram_range) = context_range(range, offset, n, len) else {
            continue;
        };
        let ngram: String = ngram_range.map(|i| sent.char_type(i).tag_char()).collect();
        sink.push(FeatureKey::TypeNgram { offset, ngram }, &mut feats);
    }
    if let Some(tag) = prev_tag {
        sink.push(
            FeatureKey::TagContext {
                offset: -1,
                tag: tag.to_string(),
            },
            &mut feats,
        );
    }

    feats
}

/// 単語文脈のn-gram範囲を返します。
///
/// 負のオフセットは単語開始位置からの左文脈、非負のオフセットは
/// 単語終了位置からの右文脈を指します。範囲が単語と重なる場合や
/// 文からはみ出す場合は `None` を返します。
#[inline(always)]
fn context_range(
    range: &Range<usize>,
    offset: i16,
    n: u8,
    len: usize,
) -> Option<Range<usize>> {
    let n = usize::from(n);
    let start = if offset < 0 {
        let back = usize::from(offset.unsigned_abs());
        // 左文脈は単語開始位置の手前で完結しなければならない。
        if back < n || back > range.start {
            return None;
        }
        range.start - back
    } else {
        range.end + usize::try_from(offset).unwrap()
    };
    let end = start + n;
    if offset >= 0 && end > len {
        return None;
    }
    Some(start..end)
}

/// 単語全体から大域タグ素性を抽出します。
///
/// 表層形そのもの、表層形の内部n-gram、ソース辞書における収録有無を
/// 素性とします。
pub(crate) fn global_features(
    sent: &Sentence,
    range: &Range<usize>,
    char_n: u8,
    dict: &Dictionary,
    sink: &mut FeatureSink,
) -> Vec<u32> {
    let chars = &sent.chars()[range.clone()];
    let mut feats = vec![];

    let surface: String = chars.iter().collect();
    sink.push(FeatureKey::SelfSurface(surface), &mut feats);

    for n in 1..=usize::from(char_n) {
        if n > chars.len() {
            break;
        }
        for start in 0..=(chars.len() - n) {
            let ngram: String = chars[start..start + n].iter().collect();
            sink.push(
                FeatureKey::SelfNgram {
                    offset: i16::try_from(start).unwrap(),
                    ngram,
                },
                &mut feats,
            );
        }
    }

    if let Some(entry) = dict.exact_match(chars) {
        let mask = entry.source_mask();
        for source in 0..8 {
            if mask & (1 << source) != 0 {
                sink.push(FeatureKey::DictSource { source }, &mut feats);
            }
        }
    }

    feats
}

/// 既知語経路のタグ候補を生成します。
///
/// 語彙辞書の完全一致からそのレベルのタグを列挙し、重みを正規化した
/// 対数確率を事前スコアとします。
pub(crate) fn known_candidates(
    dict: &Dictionary,
    chars: &[char],
    lev: usize,
) -> Vec<(String, f64)> {
    let Some(entry) = dict.exact_match(chars) else {
        return vec![];
    };
    let tags = entry.tags(lev);
    let total: f64 = tags.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return vec![];
    }
    tags.iter()
        .map(|(tag, w)| (tag.clone(), (w / total).ln()))
        .collect()
}

/// ビーム探索の状態
#[derive(Clone)]
struct BeamState {
    tag: String,
    dict_lp: f64,
}

/// 未知語経路のタグ候補を生成します。
///
/// 単語の文字列を部分語辞書の一致で先頭から敷き詰め、一致ごとの
/// タグ断片を連結して候補タグ列を構築します。各位置でビーム幅まで
/// 枝刈りし、完成した候補を部分語の対数確率と言語モデルスコアの和で
/// 順位付けして上位を返します。
///
/// 敷き詰めが単語全体を覆えない場合は空の候補集合を返します。
pub(crate) fn unknown_candidates(
    subword_dict: &Dictionary,
    lm: &CharLm,
    chars: &[char],
    lev: usize,
    beam_size: usize,
    max_tags: usize,
) -> Vec<(String, f64)> {
    let len = chars.len();
    if len == 0 {
        return vec![];
    }

    let mut beams: Vec<Vec<BeamState>> = vec![vec![]; len + 1];
    beams[0].push(BeamState {
        tag: String::new(),
        dict_lp: 0.0,
    });

    let state_score = |st: &BeamState| -> f64 {
        let tag_chars: Vec<char> = st.tag.chars().collect();
        st.dict_lp + lm.score(&tag_chars)
    };

    for pos in 0..len {
        if beams[pos].is_empty() {
            continue;
        }
        let mut states = std::mem::take(&mut beams[pos]);
        if states.len() > beam_size {
            states.sort_by(|a, b| state_score(b).partial_cmp(&state_score(a)).unwrap());
            states.truncate(beam_size);
        }
        for m in subword_dict.common_prefix_iterator(&chars[pos..]) {
            let next = pos + m.end_char;
            for (frag, lp) in m.entry.tags(lev) {
                for st in &states {
                    let mut tag = st.tag.clone();
                    tag.push_str(frag);
                    beams[next].push(BeamState {
                        tag,
                        dict_lp: st.dict_lp + lp,
                    });
                }
            }
        }
    }

    let mut finals: Vec<(String, f64)> = beams
        .pop()
        .unwrap()
        .into_iter()
        .map(|st| {
            let score = state_score(&st);
            (st.tag, score)
        })
        .collect();
    finals.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

    let mut seen = HashSet::new();
    finals.retain(|(tag, _)| seen.insert(tag.clone()));
    finals.truncate(max_tags);
    finals
}

/// 1つの単語のタグ候補を生成し、採点して選択します。
///
/// `use_dict` が真の場合は既知語経路を試み、候補が得られなければ
/// 未知語経路へ移ります。偽の場合は辞書を迂回して未知語経路のみを
/// 使用します。候補は 事前スコア + 局所スコア + 大域スコア の降順で
/// 返されます。大域語彙に含まれない候補には局所・大域スコアが
/// 加算されないため、語彙外の候補しかない場合は事前スコアによる
/// 順位がそのまま採用されます。
pub(crate) fn select_tags(
    bundle: &ModelBundle,
    sent: &Sentence,
    range: &Range<usize>,
    lev: usize,
    prev_tag: Option<&str>,
    use_dict: bool,
) -> Vec<Tag> {
    let Some(level) = bundle.levels.get(lev) else {
        return vec![];
    };
    let chars = &sent.chars()[range.clone()];

    let mut candidates = if use_dict {
        known_candidates(&bundle.dict, chars, lev)
    } else {
        vec![]
    };
    if candidates.is_empty() {
        candidates = unknown_candidates(
            &bundle.subword_dict,
            &level.unk_lm,
            chars,
            lev,
            usize::from(bundle.config.unk_beam_size),
            usize::from(bundle.config.unk_max_tags),
        );
    }
    if candidates.is_empty() {
        return vec![];
    }

    let tag_idx: HashMap<&str, usize> = level
        .global_tags
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    let tpl = NgramTemplates::from_config(&bundle.config);
    let local_feats = local_features(
        sent,
        range,
        &tpl,
        prev_tag,
        &mut FeatureSink::Infer(&level.local.features),
    );
    let local_scores = level.local.model.scores(&local_feats);
    let global_scores = level.global.as_ref().map(|global| {
        let feats = global_features(
            sent,
            range,
            bundle.config.char_n,
            &bundle.dict,
            &mut FeatureSink::Infer(&global.features),
        );
        global.model.scores(&feats)
    });

    let mut tags: Vec<Tag> = candidates
        .into_iter()
        .map(|(name, prior)| {
            let mut score = prior;
            if let Some(&idx) = tag_idx.get(name.as_str()) {
                score += local_scores.get(idx).copied().unwrap_or(0.0);
                if let Some(globals) = &global_scores {
                    score += globals.get(idx).copied().unwrap_or(0.0);
                }
            }
            Tag::new(name, score)
        })
        .collect();
    tags.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap());
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::bundle::{LevelModels, ModelConfig, ScoredModel};
    use crate::dictionary::{Entry, SubwordEntry, WordEntry};
    use crate::feature_lookup::FeatureLookup;

    fn subword(pairs: Vec<(&str, Vec<(&str, f64)>)>) -> Dictionary {
        Dictionary::from_entries(
            pairs
                .into_iter()
                .map(|(surface, tags)| {
                    (
                        surface.to_string(),
                        Entry::Subword(SubwordEntry {
                            level_tags: vec![tags
                                .into_iter()
                                .map(|(t, lp)| (t.to_string(), lp))
                                .collect()],
                        }),
                    )
                })
                .collect(),
        )
        .unwrap()
    }

    #[track_caller]
    fn build_test_bundle(dict: Dictionary, subword_dict: Dictionary, lm: CharLm) -> ModelBundle {
        ModelBundle {
            config: ModelConfig::default(),
            dict,
            subword_dict,
            ws: ScoredModel::default(),
            levels: vec![LevelModels {
                local: ScoredModel {
                    features: FeatureLookup::new(),
                    model: crate::model::LinearModel::trivial(0),
                },
                global: None,
                global_tags: vec![],
                unk_lm: lm,
            }],
        }
    }

    #[test]
    fn test_known_word() {
        // 語彙辞書に収録された "cat" には、記録されたタグが選択される。
        let dict = Dictionary::from_entries(vec![(
            "cat".to_string(),
            Entry::Word(WordEntry {
                level_tags: vec![vec![("K AE T".to_string(), 5.0)]],
                source_mask: 1,
            }),
        )])
        .unwrap();
        let bundle = build_test_bundle(
            dict,
            Dictionary::from_entries(vec![]).unwrap(),
            CharLm::new(2),
        );

        let mut sent = Sentence::new();
        sent.set_sentence("cat");
        sent.set_boundaries(vec![false, false]);

        let tags = select_tags(&bundle, &sent, &(0..3), 0, None, true);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name(), "K AE T");
    }

    #[test]
    fn test_unknown_word_beam() {
        // "zzq" は語彙辞書になく、部分語辞書と言語モデルから
        // "Z Z Q" が最上位候補として生成される。
        let subword_dict = subword(vec![
            ("z", vec![("Z ", -0.1), ("S ", -2.0)]),
            ("q", vec![("Q", -0.1)]),
        ]);
        let mut lm = CharLm::new(2);
        lm.add_sequence("Z Z Q");
        let bundle = build_test_bundle(
            Dictionary::from_entries(vec![]).unwrap(),
            subword_dict,
            lm,
        );

        let mut sent = Sentence::new();
        sent.set_sentence("zzq");
        sent.set_boundaries(vec![false, false]);

        let tags = select_tags(&bundle, &sent, &(0..3), 0, None, false);
        assert!(!tags.is_empty());
        assert_eq!(tags[0].name(), "Z Z Q");
    }

    #[test]
    fn test_empty_candidate_set() {
        // どちらの経路からも候補が得られない単語はタグなしのまま残る。
        let bundle = build_test_bundle(
            Dictionary::from_entries(vec![]).unwrap(),
            Dictionary::from_entries(vec![]).unwrap(),
            CharLm::new(2),
        );
        let mut sent = Sentence::new();
        sent.set_sentence("xy");
        sent.set_boundaries(vec![false]);
        let tags = select_tags(&bundle, &sent, &(0..2), 0, None, true);
        assert!(tags.is_empty());
    }

    #[test]
    fn test_incomplete_tiling_yields_nothing() {
        // 部分語が単語全体を覆えない場合、候補は生成されない。
        let subword_dict = subword(vec![("z", vec![("Z", -0.1)])]);
        let bundle = build_test_bundle(
            Dictionary::from_entries(vec![]).unwrap(),
            subword_dict,
            CharLm::new(2),
        );
        let mut sent = Sentence::new();
        sent.set_sentence("zq");
        sent.set_boundaries(vec![false]);
        let tags = select_tags(&bundle, &sent, &(0..2), 0, None, false);
        assert!(tags.is_empty());
    }

    #[test]
    fn test_beam_keeps_at_most_max_tags() {
        let subword_dict = subword(vec![(
            "a",
            vec![("A", -0.1), ("B", -0.2), ("C", -0.3), ("D", -0.4), ("E", -0.5)],
        )]);
        let lm = CharLm::new(2);
        let candidates =
            unknown_candidates(&subword_dict, &lm, &['a'], 0, 50, 3);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].0, "A");
    }

    #[test]
    fn test_context_range() {
        // 左文脈は単語開始位置の手前で完結する。
        assert_eq!(context_range(&(2..4), -2, 2, 6), Some(0..2));
        assert_eq!(context_range(&(2..4), -1, 2, 6), None);
        assert_eq!(context_range(&(2..4), -3, 2, 6), None);
        // 右文脈は単語終了位置から始まる。
        assert_eq!(context_range(&(2..4), 0, 2, 6), Some(4..6));
        assert_eq!(context_range(&(2..4), 1, 2, 6), None);
    }
}
