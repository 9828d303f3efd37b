//! 単語分割とタグ付与を行う解析器
//!
//! このモジュールは、学習済みモデル一式を用いて文を解析するための
//! メイン構造体を提供します。
//!
//! # 主要な構造体
//!
//! - [`Analyzer`]: 解析を実行するメインの解析器構造体
//! - [`Worker`]: 解析器のワーカー。文の状態を保持し、実際の解析処理を行う
//!
//! # 例
//!
//! ```no_run
//! use std::fs::File;
//! use kugiri::{Analyzer, ModelBundle};
//!
//! let bundle = ModelBundle::read(File::open("path/to/model")?)?;
//! let analyzer = Analyzer::new(bundle);
//! let mut worker = analyzer.new_worker();
//!
//! worker.reset_sentence("これはテストです");
//! worker.analyze();
//!
//! for i in 0..worker.num_words() {
//!     let word = worker.word(i);
//!     println!("{}", word.surface());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub(crate) mod segmenter;
pub(crate) mod tagger;

use std::sync::Arc;

use crate::bundle::ModelBundle;
use crate::sentence::{Sentence, Tag, Word};

/// 単語分割とタグ付与を行う解析器
///
/// モデル一式への共有参照を保持します。モデル一式は読み込み後不変で
/// あるため、解析器の複製を複数のスレッドへ配って独立した文を
/// 並列に解析できます。文単位の操作が互いにブロックすることは
/// ありません。
#[derive(Clone)]
pub struct Analyzer {
    bundle: Arc<ModelBundle>,
}

impl Analyzer {
    /// 新しい解析器を作成します。
    ///
    /// モデル一式は解析器に所有権が移動します。複数の解析器間で
    /// モデル一式を共有する必要がある場合は、
    /// [`Analyzer::from_shared_bundle`]を使用してください。
    ///
    /// # 引数
    ///
    /// * `bundle` - 解析に使用するモデル一式
    pub fn new(bundle: ModelBundle) -> Self {
        Self {
            bundle: Arc::new(bundle),
        }
    }

    /// 共有されたモデル一式から新しい解析器を作成します。
    ///
    /// # 引数
    ///
    /// * `bundle` - 共有されるモデル一式への`Arc`参照
    pub fn from_shared_bundle(bundle: Arc<ModelBundle>) -> Self {
        Self { bundle }
    }

    /// モデル一式への参照を返します。
    #[inline(always)]
    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    /// 新しいワーカーを作成します。
    ///
    /// ワーカーは実際の解析処理を実行するために使用されます。
    /// 各ワーカーは独立した文の状態を保持するため、複数のワーカーを
    /// 並列に使用して同時に複数の文を解析できます。
    pub fn new_worker(&self) -> Worker {
        Worker::new(self.clone())
    }

    /// 文の単語分割を計算します。
    ///
    /// 各境界候補点を独立に採点し、分割結果を文へ書き込みます。
    /// 既存の単語とタグは破棄されます。同じ文に対して再実行しても
    /// 同じ分割が得られます。
    ///
    /// # 引数
    ///
    /// * `sent` - 解析する文
    pub fn segment(&self, sent: &mut Sentence) {
        segmenter::segment(&self.bundle, sent);
    }

    /// 指定されたレベルのタグを文のすべての単語へ付与します。
    ///
    /// 単語分割が済んでいない文では何も行いません。単語は文頭から
    /// 順に処理され、直前の単語で選択されたタグが文脈素性として
    /// 使用されます。候補が得られない単語はそのレベルでタグなしの
    /// まま残されます。
    ///
    /// # 引数
    ///
    /// * `sent` - 分割済みの文
    /// * `lev` - タグ付与レベル
    pub fn tag(&self, sent: &mut Sentence, lev: usize) {
        let num_words = sent.words().len();
        let mut prev_tag: Option<String> = None;
        for i in 0..num_words {
            let range = sent.words()[i].range_char();
            let tags = tagger::select_tags(&self.bundle, sent, &range, lev, prev_tag.as_deref(), true);
            prev_tag = tags.first().map(|t| t.name().to_string());
            sent.words_mut()[i].set_tags(lev, tags);
        }
    }

    /// 1つの単語の未知語タグを計算します。
    ///
    /// 語彙辞書を迂回し、未知語経路のみで候補を生成して単語へ
    /// 書き込みます。語彙辞書に収録されている単語についても、
    /// 未知語推定の結果を得るために使用できます。
    ///
    /// # 引数
    ///
    /// * `sent` - 分割済みの文
    /// * `word_idx` - 単語の添字（0始まり）
    /// * `lev` - タグ付与レベル
    ///
    /// # パニック
    ///
    /// `word_idx` が単語数以上の場合、パニックします。
    pub fn tag_unknown(&self, sent: &mut Sentence, word_idx: usize, lev: usize) {
        let range = sent.words()[word_idx].range_char();
        let tags = tagger::select_tags(&self.bundle, sent, &range, lev, None, false);
        sent.words_mut()[word_idx].set_tags(lev, tags);
    }

    /// 文を解析します。
    ///
    /// 単語分割を行い、設定されたすべてのレベルのタグを付与します。
    ///
    /// # 引数
    ///
    /// * `sent` - 解析する文
    pub fn analyze(&self, sent: &mut Sentence) {
        self.segment(sent);
        for lev in 0..self.bundle.levels.len() {
            self.tag(sent, lev);
        }
    }
}

/// 解析処理のためのルーチンを提供する構造体
///
/// 解析対象の文の状態を保持し、再利用することで不要なメモリ割り当てを
/// 避けます。
pub struct Worker {
    analyzer: Analyzer,
    sent: Sentence,
}

impl Worker {
    /// 新しいインスタンスを作成します。
    pub(crate) fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            sent: Sentence::new(),
        }
    }

    /// 解析する入力文をリセットします。
    ///
    /// 新しい文を設定し、以前の状態をクリアします。
    ///
    /// # 引数
    ///
    /// * `input` - 解析する入力文字列
    pub fn reset_sentence<S>(&mut self, input: S)
    where
        S: AsRef<str>,
    {
        self.sent.set_sentence(input);
    }

    /// 設定された入力文の単語分割を計算します。
    pub fn segment(&mut self) {
        self.analyzer.segment(&mut self.sent);
    }

    /// 指定されたレベルのタグを付与します。
    ///
    /// # 引数
    ///
    /// * `lev` - タグ付与レベル
    pub fn tag(&mut self, lev: usize) {
        self.analyzer.tag(&mut self.sent, lev);
    }

    /// 設定された入力文を解析します。
    ///
    /// 単語分割とすべてのレベルのタグ付与を行います。解析結果は
    /// 内部状態に保存され、`word()`や`num_words()`でアクセスできます。
    pub fn analyze(&mut self) {
        self.analyzer.analyze(&mut self.sent);
    }

    /// 解析中の文への参照を返します。
    #[inline(always)]
    pub fn sentence(&self) -> &Sentence {
        &self.sent
    }

    /// 解析結果の単語数を返します。
    #[inline(always)]
    pub fn num_words(&self) -> usize {
        self.sent.words().len()
    }

    /// `i`番目の単語を取得します。
    ///
    /// # 引数
    ///
    /// * `i` - 単語の添字（0始まり）
    #[inline(always)]
    pub fn word(&self, i: usize) -> AnalyzedWord<'_> {
        AnalyzedWord {
            sent: &self.sent,
            word: &self.sent.words()[i],
        }
    }

    /// 解析結果の単語のイテレータを作成します。
    pub fn word_iter(&self) -> impl Iterator<Item = AnalyzedWord<'_>> + '_ {
        self.sent.words().iter().map(move |word| AnalyzedWord {
            sent: &self.sent,
            word,
        })
    }
}

/// 解析結果の単語への参照
///
/// 表層形の導出に必要な文への参照を併せて保持します。
pub struct AnalyzedWord<'a> {
    sent: &'a Sentence,
    word: &'a Word,
}

impl<'a> AnalyzedWord<'a> {
    /// 単語の表層形を返します。
    #[inline(always)]
    pub fn surface(&self) -> &'a str {
        self.sent.surface(self.word)
    }

    /// 文中の文字範囲を返します。
    #[inline(always)]
    pub fn range_char(&self) -> std::ops::Range<usize> {
        self.word.range_char()
    }

    /// 指定されたレベルのタグ候補をスコア降順で返します。
    #[inline(always)]
    pub fn tags(&self, lev: usize) -> &'a [Tag] {
        self.word.tags(lev)
    }

    /// 指定されたレベルの最良タグを返します。
    #[inline(always)]
    pub fn best_tag(&self, lev: usize) -> Option<&'a Tag> {
        self.word.tags(lev).first()
    }
}
