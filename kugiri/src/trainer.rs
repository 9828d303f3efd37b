//! モデル学習のためのモジュール
//!
//! このモジュールは、解析器の学習に必要な機能を提供します。
//! アノテーション付きコーパスと外部辞書から、境界判定モデル・
//! レベルごとのタグ付与モデル・辞書・素性ID対応表を含むモデル一式を
//! 学習します。
//!
//! # 概要
//!
//! 学習は厳密に逐次的な段階の列であり、各段階の出力が次の段階の入力に
//! なります:
//!
//! 1. 事前検査 — 設定とコーパスの不整合を検出し、学習を始める前に失敗します
//! 2. 語彙構築 — コーパスと外部辞書から語彙辞書と部分語辞書を構築します
//! 3. 境界モデル学習 — 文字・文字種・辞書素性による境界判定を学習します
//! 4. テンプレート準備 — タグ素性のn-gramテンプレートを事前計算します
//! 5. 局所タグモデル学習（レベルごと）
//! 6. 大域タグモデル学習（レベルごと）
//! 7. 未知語モデル学習（レベルごと）
//!
//! 各段階は、素性ベクトルと正解ラベルの組を抽出し（必要に応じて
//! 素性IDを新規割り当てします）、線形モデルの学習ルーチンへ渡して、
//! 得られたモデルをモデル一式に保持します。段階をまたいだ反復学習は
//! 行いません。
//!
//! # 使用例
//!
//! ```no_run
//! use std::fs::File;
//! use kugiri::trainer::{Corpus, Trainer};
//! use kugiri::{Analyzer, ModelConfig};
//!
//! let corpus = Corpus::from_reader(File::open("corpus.txt")?)?;
//! let trainer = Trainer::new(ModelConfig::default())?
//!     .cost(1.0)
//!     .epsilon(0.01);
//! let bundle = trainer.train(corpus, vec![])?;
//!
//! let mut f = File::create("model.bin")?;
//! bundle.write(&mut f)?;
//!
//! let analyzer = Analyzer::new(bundle);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod corpus;

use hashbrown::HashMap;

use crate::analyzer::segmenter::{extract_boundary_features, FeatureSink, NgramTemplates};
use crate::analyzer::tagger::{global_features, local_features};
use crate::bundle::{LevelModels, ModelBundle, ModelConfig, ScoredModel};
use crate::dictionary::{Dictionary, Entry, SubwordEntry, WordEntry};
use crate::errors::{KugiriError, Result};
use crate::feature_lookup::FeatureLookup;
use crate::lm::CharLm;
use crate::model;

pub use crate::trainer::corpus::{read_dictionary_entries, Corpus, Example, Word};

/// 語彙構築中のエントリの集計
#[derive(Default)]
struct EntryAcc {
    level_tags: Vec<HashMap<String, f64>>,
    source_mask: u8,
}

impl EntryAcc {
    fn add(&mut self, n_levels: usize, tags: &[String], weight: f64, source: u8) {
        if self.level_tags.len() < n_levels {
            self.level_tags.resize_with(n_levels, HashMap::new);
        }
        self.source_mask |= 1 << source;
        for (lev, tag) in tags.iter().enumerate().take(n_levels) {
            *self.level_tags[lev].entry(tag.clone()).or_insert(0.0) += weight;
        }
    }
}

/// 解析器のトレーナー
///
/// アノテーション付きコーパスからモデル一式を学習します。
/// 設定はコンストラクタで固定され、学習されたモデルと共に保存されます。
pub struct Trainer {
    config: ModelConfig,
    cost: f64,
    epsilon: f64,
}

impl Trainer {
    /// 指定された設定を使用して新しい [`Trainer`] を作成します。
    ///
    /// # 引数
    ///
    /// * `config` - 学習設定
    ///
    /// # 戻り値
    ///
    /// 初期化されたトレーナー
    ///
    /// # エラー
    ///
    /// 設定に不整合がある場合、[`KugiriError`] が返されます。
    pub fn new(config: ModelConfig) -> Result<Self> {
        if config.n_levels == 0 {
            return Err(KugiriError::invalid_argument(
                "config",
                "n_levels must be at least 1.",
            ));
        }
        if config.char_n == 0 || config.char_window == 0 {
            return Err(KugiriError::invalid_argument(
                "config",
                "char_n and char_window must be at least 1.",
            ));
        }
        if config.type_n == 0 || config.type_window == 0 {
            return Err(KugiriError::invalid_argument(
                "config",
                "type_n and type_window must be at least 1.",
            ));
        }
        if config.dict_n == 0 {
            return Err(KugiriError::invalid_argument(
                "config",
                "dict_n must be at least 1.",
            ));
        }
        if config.unk_beam_size == 0 || config.unk_max_tags == 0 {
            return Err(KugiriError::invalid_argument(
                "config",
                "unk_beam_size and unk_max_tags must be at least 1.",
            ));
        }
        if config.unk_lm_order == 0 {
            return Err(KugiriError::invalid_argument(
                "config",
                "unk_lm_order must be at least 1.",
            ));
        }
        Ok(Self {
            config,
            cost: 1.0,
            epsilon: 0.01,
        })
    }

    /// 制約違反のコストパラメータCを変更します。
    ///
    /// デフォルト値は 1.0 です。
    ///
    /// # パニック
    ///
    /// 値が0以下の場合、パニックします。
    pub fn cost(mut self, cost: f64) -> Self {
        assert!(cost > 0.0);
        self.cost = cost;
        self
    }

    /// 終了条件の許容誤差を変更します。
    ///
    /// デフォルト値は 0.01 です。
    ///
    /// # パニック
    ///
    /// 値が0以下の場合、パニックします。
    pub fn epsilon(mut self, epsilon: f64) -> Self {
        assert!(epsilon > 0.0);
        self.epsilon = epsilon;
        self
    }

    /// 学習を開始し、モデル一式を返します。
    ///
    /// # 引数
    ///
    /// * `corpus` - 学習に使用するコーパス
    /// * `dictionaries` - 外部辞書のエントリ列。i番目の辞書はソース
    ///   ビット i+1 に対応します（ビット0はコーパス）。
    ///
    /// # 戻り値
    ///
    /// 学習済みのモデル一式
    ///
    /// # エラー
    ///
    /// 事前検査に失敗した場合、または線形モデルの学習に失敗した場合、
    /// [`KugiriError`] が返されます。部分的なモデルが返されることは
    /// ありません。
    pub fn train(self, corpus: Corpus, dictionaries: Vec<Vec<Word>>) -> Result<ModelBundle> {
        self.sanity_check(&corpus, &dictionaries)?;

        log::info!("Building the vocabulary...");
        let (dict, subword_dict) = self.build_vocabulary(&corpus, &dictionaries)?;

        log::info!("Training the word segmentation model...");
        let ws = self.train_ws(&corpus, &dict)?;

        let templates = self.prepare_prefixes();

        let n_levels = usize::from(self.config.n_levels);
        let mut locals = vec![];
        for lev in 0..n_levels {
            log::info!("Training the local tagging model (level {})...", lev);
            locals.push(self.train_local_tags(&corpus, &templates, lev)?);
        }
        let mut globals = vec![];
        for (lev, (_, tags)) in locals.iter().enumerate() {
            log::info!("Training the global tagging model (level {})...", lev);
            globals.push(self.train_global_tags(&corpus, &dict, tags, lev)?);
        }
        let mut lms = vec![];
        for lev in 0..n_levels {
            log::info!("Training the unknown word model (level {})...", lev);
            lms.push(self.train_unk(&corpus, &dictionaries, lev));
        }

        let mut levels = vec![];
        for ((local, global_tags), (global, unk_lm)) in locals
            .into_iter()
            .zip(globals.into_iter().zip(lms.into_iter()))
        {
            levels.push(LevelModels {
                local,
                global: Some(global),
                global_tags,
                unk_lm,
            });
        }

        Ok(ModelBundle {
            config: self.config,
            dict,
            subword_dict,
            ws,
            levels,
        })
    }

    /// 学習を始める前に設定とコーパスの整合性を検査します。
    ///
    /// 検査に失敗した場合、学習は一切行われません。
    fn sanity_check(&self, corpus: &Corpus, dictionaries: &[Vec<Word>]) -> Result<()> {
        if corpus.iter().all(|e| e.words.is_empty()) {
            return Err(KugiriError::invalid_argument(
                "corpus",
                "The training corpus contains no example.",
            ));
        }
        if dictionaries.len() > 7 {
            return Err(KugiriError::invalid_argument(
                "dictionaries",
                "At most 7 external dictionaries are supported.",
            ));
        }
        for lev in 0..usize::from(self.config.n_levels) {
            let has_example = corpus
                .iter()
                .flat_map(|e| e.words.iter())
                .any(|w| w.tag(lev).is_some());
            if !has_example {
                return Err(KugiriError::invalid_argument(
                    "corpus",
                    format!("No annotated example for tagging level {}.", lev),
                ));
            }
        }
        Ok(())
    }

    /// コーパスと外部辞書から語彙辞書と部分語辞書を構築します。
    ///
    /// 語彙辞書には単語ごとにレベル別のタグ出現回数とソースビットマスクが
    /// 記録されます。部分語辞書には設定された長さ以下の表層形が登録され、
    /// タグの重みは表層形・レベルごとに正規化された対数確率になります。
    fn build_vocabulary(
        &self,
        corpus: &Corpus,
        dictionaries: &[Vec<Word>],
    ) -> Result<(Dictionary, Dictionary)> {
        let n_levels = usize::from(self.config.n_levels);
        let mut vocab: HashMap<String, EntryAcc> = HashMap::new();

        for example in corpus.iter() {
            for word in &example.words {
                vocab
                    .entry(word.surface().to_string())
                    .or_default()
                    .add(n_levels, word.tags(), 1.0, 0);
            }
        }
        for (i, entries) in dictionaries.iter().enumerate() {
            let source = u8::try_from(i + 1).unwrap();
            for word in entries {
                vocab
                    .entry(word.surface().to_string())
                    .or_default()
                    .add(n_levels, word.tags(), 1.0, source);
            }
        }

        let max_subword = usize::from(self.config.unk_subword_len);
        let mut word_entries = vec![];
        let mut subword_entries = vec![];
        for (surface, acc) in vocab {
            let mut level_tags: Vec<Vec<(String, f64)>> = acc
                .level_tags
                .iter()
                .map(|tags| {
                    let mut tags: Vec<(String, f64)> =
                        tags.iter().map(|(t, w)| (t.clone(), *w)).collect();
                    tags.sort_by(|a, b| a.0.cmp(&b.0));
                    tags
                })
                .collect();
            level_tags.resize_with(n_levels, Vec::new);

            if surface.chars().count() <= max_subword {
                let subword_tags: Vec<Vec<(String, f64)>> = level_tags
                    .iter()
                    .map(|tags| {
                        let total: f64 = tags.iter().map(|(_, w)| w).sum();
                        tags.iter()
                            .map(|(t, w)| (t.clone(), (w / total).ln()))
                            .collect()
                    })
                    .collect();
                subword_entries.push((
                    surface.clone(),
                    Entry::Subword(SubwordEntry {
                        level_tags: subword_tags,
                    }),
                ));
            }

            word_entries.push((
                surface,
                Entry::Word(WordEntry {
                    level_tags,
                    source_mask: acc.source_mask,
                }),
            ));
        }

        Ok((
            Dictionary::from_entries(word_entries)?,
            Dictionary::from_entries(subword_entries)?,
        ))
    }

    /// 境界判定モデルを学習します。
    ///
    /// コーパスの各文について境界候補点ごとの素性ベクトルと正解ラベルを
    /// 抽出し、線形モデルを学習します。
    fn train_ws(&self, corpus: &Corpus, dict: &Dictionary) -> Result<ScoredModel> {
        let templates = NgramTemplates::from_config(&self.config);
        let mut lookup = FeatureLookup::new();
        let mut examples = vec![];
        for example in corpus.iter() {
            let sent = &example.sentence;
            if sent.len_char() < 2 {
                continue;
            }
            let features = extract_boundary_features(
                sent,
                &self.config,
                &templates,
                dict,
                &mut FeatureSink::Train(&mut lookup),
            );
            for (feats, &is_boundary) in features.into_iter().zip(sent.boundaries()) {
                examples.push((feats, usize::from(is_boundary)));
            }
        }
        let model = model::fit(&examples, 2, lookup.len(), self.cost, self.epsilon)?;
        Ok(ScoredModel {
            features: lookup,
            model,
        })
    }

    /// タグ素性のn-gramテンプレートを事前計算します。
    ///
    /// 以降のすべてのタグ付与段階で共有されます。
    fn prepare_prefixes(&self) -> NgramTemplates {
        NgramTemplates::from_config(&self.config)
    }

    /// 指定されたレベルの局所タグモデルを学習します。
    ///
    /// レベルのタグ語彙（ソート済み）と、単語の文脈素性から正解タグを
    /// 選択する多値線形モデルを返します。学習時の文脈タグには正解タグを
    /// 使用します。
    fn train_local_tags(
        &self,
        corpus: &Corpus,
        templates: &NgramTemplates,
        lev: usize,
    ) -> Result<(ScoredModel, Vec<String>)> {
        let mut tags: Vec<String> = corpus
            .iter()
            .flat_map(|e| e.words.iter())
            .filter_map(|w| w.tag(lev).map(|t| t.to_string()))
            .collect();
        tags.sort();
        tags.dedup();
        let tag_idx: HashMap<&str, usize> = tags
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();

        let mut lookup = FeatureLookup::new();
        let mut examples = vec![];
        for example in corpus.iter() {
            let sent = &example.sentence;
            let mut prev_tag: Option<&str> = None;
            for (i, word) in example.words.iter().enumerate() {
                if let Some(gold) = word.tag(lev) {
                    let range = sent.words()[i].range_char();
                    let feats = local_features(
                        sent,
                        &range,
                        templates,
                        prev_tag,
                        &mut FeatureSink::Train(&mut lookup),
                    );
                    // 文脈が一切ない単語（文全体を覆う先頭の単語）は素性を持たない。
                    if !feats.is_empty() {
                        examples.push((feats, tag_idx[gold]));
                    }
                }
                prev_tag = word.tag(lev);
            }
        }

        let model = model::fit(&examples, tags.len(), lookup.len(), self.cost, self.epsilon)?;
        drop(tag_idx);
        Ok((
            ScoredModel {
                features: lookup,
                model,
            },
            tags,
        ))
    }

    /// 指定されたレベルの大域タグモデルを学習します。
    ///
    /// 単語全体の素性（表層形、内部n-gram、辞書収録有無）から正解タグを
    /// 選択する多値線形モデルを学習します。タグ語彙は局所モデルと
    /// 共有されます。
    fn train_global_tags(
        &self,
        corpus: &Corpus,
        dict: &Dictionary,
        tags: &[String],
        lev: usize,
    ) -> Result<ScoredModel> {
        let tag_idx: HashMap<&str, usize> = tags
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();

        let mut lookup = FeatureLookup::new();
        let mut examples = vec![];
        for example in corpus.iter() {
            let sent = &example.sentence;
            for (i, word) in example.words.iter().enumerate() {
                if let Some(gold) = word.tag(lev) {
                    let range = sent.words()[i].range_char();
                    let feats = global_features(
                        sent,
                        &range,
                        self.config.char_n,
                        dict,
                        &mut FeatureSink::Train(&mut lookup),
                    );
                    examples.push((feats, tag_idx[gold]));
                }
            }
        }

        let model = model::fit(&examples, tags.len(), lookup.len(), self.cost, self.epsilon)?;
        Ok(ScoredModel {
            features: lookup,
            model,
        })
    }

    /// 指定されたレベルの未知語言語モデルを学習します。
    ///
    /// コーパスと外部辞書に現れたこのレベルのタグ文字列で
    /// 文字n-gram言語モデルを学習します。
    fn train_unk(&self, corpus: &Corpus, dictionaries: &[Vec<Word>], lev: usize) -> CharLm {
        let mut lm = CharLm::new(self.config.unk_lm_order);
        for example in corpus.iter() {
            for word in &example.words {
                if let Some(tag) = word.tag(lev) {
                    lm.add_sequence(tag);
                }
            }
        }
        for entries in dictionaries {
            for word in entries {
                if let Some(tag) = word.tag(lev) {
                    lm.add_sequence(tag);
                }
            }
        }
        lm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::analyzer::Analyzer;
    use crate::sentence::Sentence;

    fn train_small_model() -> ModelBundle {
        let corpus_data = "\
ab/AB cd/CD
ab/AB ef/EF
cd/CD ab/AB
ef/EF cd/CD
";
        let corpus = Corpus::from_reader(corpus_data.as_bytes()).unwrap();
        Trainer::new(ModelConfig::default())
            .unwrap()
            .train(corpus, vec![])
            .unwrap()
    }

    #[test]
    fn test_train_and_analyze() {
        let bundle = train_small_model();
        let analyzer = Analyzer::new(bundle);
        let mut sent = Sentence::new();
        sent.set_sentence("abcd");
        analyzer.analyze(&mut sent);

        let words = sent.words();
        assert_eq!(words.len(), 2);
        assert_eq!(sent.surface(&words[0]), "ab");
        assert_eq!(sent.surface(&words[1]), "cd");
        assert_eq!(words[0].best_tag(0).unwrap().name(), "AB");
        assert_eq!(words[1].best_tag(0).unwrap().name(), "CD");
    }

    #[test]
    fn test_feature_id_stability_over_round_trip() {
        // 保存と読み込みを挟んでも、同じ文に対して同じ解析結果が得られる。
        let bundle = train_small_model();
        let mut buf = vec![];
        bundle.write(&mut buf).unwrap();
        let reloaded = ModelBundle::read(buf.as_slice()).unwrap();

        let analyzer1 = Analyzer::new(bundle);
        let analyzer2 = Analyzer::new(reloaded);
        for input in ["abcd", "efab", "abxyz"] {
            let mut sent1 = Sentence::new();
            sent1.set_sentence(input);
            analyzer1.analyze(&mut sent1);
            let mut sent2 = Sentence::new();
            sent2.set_sentence(input);
            analyzer2.analyze(&mut sent2);

            assert_eq!(sent1.boundaries(), sent2.boundaries());
            let tags1: Vec<Option<&str>> = sent1
                .words()
                .iter()
                .map(|w| w.best_tag(0).map(|t| t.name()))
                .collect();
            let tags2: Vec<Option<&str>> = sent2
                .words()
                .iter()
                .map(|w| w.best_tag(0).map(|t| t.name()))
                .collect();
            assert_eq!(tags1, tags2);
        }
    }

    #[test]
    fn test_sanity_check_empty_corpus() {
        let corpus = Corpus::from_reader("".as_bytes()).unwrap();
        let result = Trainer::new(ModelConfig::default())
            .unwrap()
            .train(corpus, vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sanity_check_missing_level() {
        // レベル1が設定されているのに、コーパスにレベル1のタグがない。
        let corpus = Corpus::from_reader("ab/AB cd/CD\n".as_bytes()).unwrap();
        let config = ModelConfig {
            n_levels: 2,
            ..Default::default()
        };
        let result = Trainer::new(config).unwrap().train(corpus, vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_config() {
        let config = ModelConfig {
            n_levels: 0,
            ..Default::default()
        };
        assert!(Trainer::new(config).is_err());
    }

    #[test]
    fn test_external_dictionary_sources() {
        // 外部辞書のエントリにはソースビット1が立つ。
        let corpus = Corpus::from_reader("ab/AB\n".as_bytes()).unwrap();
        let dict_entries = read_dictionary_entries("xy/XY\n".as_bytes()).unwrap();
        let bundle = Trainer::new(ModelConfig::default())
            .unwrap()
            .train(corpus, vec![dict_entries])
            .unwrap();

        let key: Vec<char> = "xy".chars().collect();
        let entry = bundle.dict.exact_match(&key).unwrap();
        assert_eq!(entry.source_mask(), 1 << 1);
        let key: Vec<char> = "ab".chars().collect();
        let entry = bundle.dict.exact_match(&key).unwrap();
        assert_eq!(entry.source_mask(), 1 << 0);
    }
}
