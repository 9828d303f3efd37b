//! # Kugiri
//!
//! Kugiriは、明示的な単語境界を持たない言語のための、点予測に基づく
//! 単語分割とタグ付与の実装です。
//!
//! ## 概要
//!
//! このライブラリは、文字列を単語へ分割し、各単語にレベルごとの
//! タグ（読み、品詞など）を付与する解析器を提供します。解析は
//! 次の段階で構成されます:
//!
//! 1. **単語境界判定**: 隣接する文字の間それぞれを線形モデルで
//!    独立に採点し、単語分割を決定します
//! 2. **タグ候補生成**: 語彙辞書の検索と、部分語辞書・文字言語モデルに
//!    よる未知語推定を組み合わせて候補を生成します
//! 3. **タグ選択**: 局所モデル（文字文脈）と大域モデル（単語全体）で
//!    候補を採点し、最良のタグを選択します
//!
//! 辞書に収録されていない未知語にも、部分語の敷き詰めによる
//! ビーム探索でタグ候補が生成されます。
//!
//! ## 主な機能
//!
//! - **学習可能な単一モデル**: 境界判定・タグ付与・未知語推定のすべてを
//!   1つのモデルファイルとして保存・読み込みできます
//! - **複数ソース辞書**: 学習コーパスに加えて複数の外部辞書を統合し、
//!   ソースごとの収録有無が素性として扱われます
//! - **並行解析**: モデル一式は読み込み後不変であり、独立した文の
//!   解析は完全に並列実行できます
//! - **学習機能**: liblinearによるモデル学習（`train`フィーチャー有効時）
//!
//! ## 使用例
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::fs::File;
//! use kugiri::{Analyzer, ModelBundle};
//!
//! let bundle = ModelBundle::read(File::open("path/to/model.bin")?)?;
//! let analyzer = Analyzer::new(bundle);
//! let mut worker = analyzer.new_worker();
//!
//! worker.reset_sentence("これはテストです");
//! worker.analyze();
//!
//! for word in worker.word_iter() {
//!     match word.best_tag(0) {
//!         Some(tag) => println!("{}\t{}", word.surface(), tag.name()),
//!         None => println!("{}\t*", word.surface()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#[cfg(not(any(target_pointer_width = "32", target_pointer_width = "64")))]
compile_error!("`target_pointer_width` must be 32 or 64");

/// 解析器の実装
pub mod analyzer;

/// 学習済みモデル一式の管理
pub mod bundle;

/// 共通の設定とユーティリティ
pub(crate) mod common;

/// 辞書データ構造
pub mod dictionary;

/// エラー型の定義
pub mod errors;

/// 素性IDの対応表
pub mod feature_lookup;

/// 文字n-gram言語モデル
pub mod lm;

/// 線形採点モデル
pub mod model;

/// 文の内部表現
pub mod sentence;

/// モデル学習機能
///
/// `train`フィーチャーが有効な場合のみ利用可能です。
/// liblinearを用いたモデルパラメータの学習を提供します。
#[cfg(feature = "train")]
pub mod trainer;

// Re-exports
pub use analyzer::{AnalyzedWord, Analyzer, Worker};
pub use bundle::{LevelModels, ModelBundle, ModelConfig, ScoredModel, MODEL_MAGIC};
pub use dictionary::Dictionary;
pub use sentence::{CharType, Sentence, Tag, Word};

/// このライブラリのバージョン番号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
