//! コーパスデータ構造のモジュール
//!
//! このモジュールは、学習用コーパスと外部辞書ファイルの読み込みに
//! 必要なデータ構造を提供します。
//!
//! コーパスの各行は1つの文であり、単語を空白で区切った完全アノテーション
//! 形式です。各単語は `表層形/タグ1/タグ2/...` のようにスラッシュで
//! タグを連結します。タグは設定されたレベル数より少なくても構いません。
//! 外部辞書ファイルは1行に1エントリで、同じ `表層形/タグ1/...` 形式です。

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::ops::{Deref, DerefMut};

use crate::errors::{KugiriError, Result};
use crate::sentence::Sentence;

/// 表層形とタグ列のペアの表現
///
/// 学習データの単語を表します。
pub struct Word {
    surface: String,
    tags: Vec<String>,
}

impl Word {
    /// 新しい単語を作成します。
    ///
    /// # 引数
    ///
    /// * `surface` - 表層形
    /// * `tags` - レベル順のタグ列
    pub(crate) fn new(surface: &str, tags: Vec<String>) -> Self {
        Self {
            surface: surface.to_string(),
            tags,
        }
    }

    /// 表層形の文字列を返します。
    pub fn surface(&self) -> &str {
        &self.surface
    }

    /// 指定されたレベルの正解タグを返します。
    ///
    /// # 引数
    ///
    /// * `lev` - タグ付与レベル
    ///
    /// # 戻り値
    ///
    /// タグが付与されている場合は`Some(&str)`、いない場合は`None`。
    pub fn tag(&self, lev: usize) -> Option<&str> {
        self.tags.get(lev).map(|t| t.as_str())
    }

    /// タグ列を返します。
    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

/// 文の表現
///
/// 学習データの1つの例文を表します。正解の単語分割が文へ反映された
/// 状態で保持されます。
pub struct Example {
    /// 単語の連結から構築された文。
    pub(crate) sentence: Sentence,

    /// 単語のリスト。
    pub(crate) words: Vec<Word>,
}

impl Example {
    /// 例文を指定されたシンクに書き込みます。
    ///
    /// # 引数
    ///
    /// * `wtr` - 書き込み先
    ///
    /// # エラー
    ///
    /// 書き込みに失敗した場合、I/Oエラーが返されます。
    pub fn write<W>(&self, wtr: W) -> Result<()>
    where
        W: Write,
    {
        let mut wtr = BufWriter::new(wtr);
        for (i, word) in self.words.iter().enumerate() {
            if i != 0 {
                write!(&mut wtr, " ")?;
            }
            write!(&mut wtr, "{}", word.surface)?;
            for tag in &word.tags {
                write!(&mut wtr, "/{}", tag)?;
            }
        }
        writeln!(&mut wtr)?;
        Ok(())
    }

    /// 単語のスライスを返します。
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// 文への参照を返します。
    pub fn sentence(&self) -> &Sentence {
        &self.sentence
    }
}

/// コーパスの表現
///
/// 学習データの例文集合を表します。
pub struct Corpus {
    /// 例文のリスト。
    pub(crate) examples: Vec<Example>,
}

impl Corpus {
    /// 指定されたシンクからコーパスを読み込みます。
    ///
    /// 各行は空白区切りの `表層形/タグ1/タグ2/...` 形式の単語列です。
    /// 空行は無視されます。
    ///
    /// # 引数
    ///
    /// * `rdr` - コーパスのリーダー
    ///
    /// # 戻り値
    ///
    /// 読み込まれたコーパス
    ///
    /// # エラー
    ///
    /// 入力形式が不正な場合、[`KugiriError`] が返されます。
    pub fn from_reader<R>(rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let buf = BufReader::new(rdr);

        let mut examples = vec![];
        for line in buf.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut words = vec![];
            let mut input = String::new();
            for token in line.split_whitespace() {
                let word = parse_annotated_word(token, "corpus")?;
                input.push_str(word.surface());
                words.push(word);
            }
            let mut sentence = Sentence::new();
            sentence.set_sentence(input);
            let lens: Vec<usize> = words
                .iter()
                .map(|w| w.surface().chars().count())
                .collect();
            sentence.set_partition(&lens);
            examples.push(Example { sentence, words });
        }

        Ok(Self { examples })
    }
}

impl Deref for Corpus {
    type Target = [Example];

    fn deref(&self) -> &Self::Target {
        &self.examples
    }
}

impl DerefMut for Corpus {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.examples
    }
}

/// `表層形/タグ1/タグ2/...` 形式のトークンを解析します。
fn parse_annotated_word(token: &str, name: &'static str) -> Result<Word> {
    let mut spl = token.split('/');
    let surface = spl.next().unwrap_or("");
    if surface.is_empty() {
        return Err(KugiriError::invalid_format(
            name,
            format!("A token must begin with a surface: {:?}", token),
        ));
    }
    let tags: Vec<String> = spl
        .map(|t| t.to_string())
        .collect();
    if tags.iter().any(|t| t.is_empty()) {
        return Err(KugiriError::invalid_format(
            name,
            format!("A tag must not be empty: {:?}", token),
        ));
    }
    Ok(Word::new(surface, tags))
}

/// 外部辞書ファイルを読み込みます。
///
/// 1行に1エントリで、各行は `表層形/タグ1/タグ2/...` 形式です。
/// 空行は無視されます。
///
/// # 引数
///
/// * `rdr` - 辞書ファイルのリーダー
///
/// # 戻り値
///
/// 読み込まれたエントリのリスト
///
/// # エラー
///
/// 入力形式が不正な場合、[`KugiriError`] が返されます。
pub fn read_dictionary_entries<R>(rdr: R) -> Result<Vec<Word>>
where
    R: Read,
{
    let buf = BufReader::new(rdr);
    let mut entries = vec![];
    for line in buf.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.split_whitespace().nth(1).is_some() {
            return Err(KugiriError::invalid_format(
                "dictionary",
                format!("Each line must contain a single entry: {:?}", line),
            ));
        }
        entries.push(parse_annotated_word(line, "dictionary")?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_corpus() {
        let corpus_data = "\
トスカーナ/トスカーナ 地方/チホー に/ニ 行く/イク
火星/カセー/名詞 猫/ネコ/名詞
";

        let corpus = Corpus::from_reader(corpus_data.as_bytes()).unwrap();

        assert_eq!(2, corpus.examples.len());

        let example1 = &corpus.examples[0];
        assert_eq!("トスカーナ地方に行く", example1.sentence.raw());
        assert_eq!(4, example1.words.len());
        assert_eq!("トスカーナ", example1.words[0].surface());
        assert_eq!(Some("トスカーナ"), example1.words[0].tag(0));
        assert_eq!(None, example1.words[0].tag(1));
        assert_eq!("地方", example1.words[1].surface());

        // 正解分割が文へ反映されていること。
        assert_eq!(example1.sentence.words().len(), 4);

        let example2 = &corpus.examples[1];
        assert_eq!("火星猫", example2.sentence.raw());
        assert_eq!(Some("名詞"), example2.words[0].tag(1));
        assert_eq!(Some("ネコ"), example2.words[1].tag(0));
    }

    #[test]
    fn test_example_round_trip() {
        let corpus_data = "火星/カセー/名詞 猫/ネコ/名詞\n";
        let corpus = Corpus::from_reader(corpus_data.as_bytes()).unwrap();
        let mut buf = vec![];
        corpus.examples[0].write(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), corpus_data);
    }

    #[test]
    fn test_invalid_token() {
        assert!(Corpus::from_reader("/タグ\n".as_bytes()).is_err());
        assert!(Corpus::from_reader("語//\n".as_bytes()).is_err());
    }

    #[test]
    fn test_read_dictionary_entries() {
        let data = "\
猫/ネコ

犬/イヌ/名詞
";
        let entries = read_dictionary_entries(data.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].surface(), "猫");
        assert_eq!(entries[1].tag(1), Some("名詞"));

        assert!(read_dictionary_entries("猫/ネコ 犬/イヌ".as_bytes()).is_err());
    }
}
