//! 解析用辞書モジュール
//!
//! このモジュールは、単語境界判定とタグ候補生成に使用される辞書構造を
//! 提供します。辞書は表層形をキーとし、タグ付与レベルごとの
//! (タグ, 重み) の分布をエントリとして保持します。
//!
//! 辞書には2つの独立したインスタンスが存在します:
//!
//! - 語彙辞書: 単語をキーとし、辞書素性と既知語のタグ候補に使用されます
//! - 部分語辞書: 短い文字列をキーとし、未知語のタグ候補生成に使用されます
//!
//! 検索はダブル配列トライによって行われ、エントリ数に対して劣線形です。
//! 辞書は学習時またはモデル読み込み時に一度だけ構築され、
//! 解析中は読み取り専用です。

pub(crate) mod trie;

use bincode::{Decode, Encode};

use crate::dictionary::trie::Trie;
use crate::errors::Result;

/// 語彙辞書のエントリ
///
/// タグ付与レベルごとの (タグ, 重み) のリストと、このエントリを含む
/// ソース辞書のビットマスクを保持します。重みは学習コーパスおよび
/// ソース辞書での出現回数の累積です。
#[derive(Debug, Clone, Default, Decode, Encode)]
pub struct WordEntry {
    pub(crate) level_tags: Vec<Vec<(String, f64)>>,
    pub(crate) source_mask: u8,
}

/// 部分語辞書のエントリ
///
/// タグ付与レベルごとの (タグ断片, 対数確率) のリストを保持します。
/// 未知語のタグ候補生成において、単語を部分語で敷き詰める際の
/// 事前スコアとして使用されます。
#[derive(Debug, Clone, Default, Decode, Encode)]
pub struct SubwordEntry {
    pub(crate) level_tags: Vec<Vec<(String, f64)>>,
}

/// 辞書エントリ
///
/// 既知語エントリと部分語エントリのタグ付きバリアントです。
/// 辞書構築後は不変です。
#[derive(Debug, Clone, Decode, Encode)]
pub enum Entry {
    /// 語彙辞書のエントリ
    Word(WordEntry),

    /// 部分語辞書のエントリ
    Subword(SubwordEntry),
}

impl Entry {
    /// 指定されたレベルの (タグ, 重み) リストを返します。
    ///
    /// # 引数
    ///
    /// * `lev` - タグ付与レベル
    ///
    /// # 戻り値
    ///
    /// タグと重みのスライス。レベルにタグがない場合は空のスライス。
    #[inline(always)]
    pub fn tags(&self, lev: usize) -> &[(String, f64)] {
        let level_tags = match self {
            Self::Word(e) => &e.level_tags,
            Self::Subword(e) => &e.level_tags,
        };
        level_tags.get(lev).map_or(&[], |t| t.as_slice())
    }

    /// このエントリを含むソース辞書のビットマスクを返します。
    ///
    /// ビット0は学習コーパス、ビット1以降は外部辞書に対応します。
    /// 部分語エントリは常に0を返します。
    #[inline(always)]
    pub fn source_mask(&self) -> u8 {
        match self {
            Self::Word(e) => e.source_mask,
            Self::Subword(_) => 0,
        }
    }
}

/// 解析用の読み取り専用辞書
///
/// 表層形からエントリへの検索構造です。位置を指定した
/// 「その位置から始まるすべての一致」の列挙と、完全一致検索を
/// 提供します。表層形とエントリは並行配列として保持され、
/// トライの値が配列の添字になります。
#[derive(Decode, Encode)]
pub struct Dictionary {
    surfaces: Vec<String>,
    entries: Vec<Entry>,
    trie: Option<Trie>,
}

/// 辞書マッチング結果
pub struct DictMatch<'a> {
    /// 一致終了位置（検索開始位置からの文字数）
    pub end_char: usize,

    /// 一致したエントリ
    pub entry: &'a Entry,
}

impl Dictionary {
    /// 表層形とエントリのペアから辞書を構築します。
    ///
    /// ペアは表層形でソートされ、重複は許されません。
    /// 空の辞書も許容されます（すべての検索が空の結果を返します）。
    ///
    /// # 引数
    ///
    /// * `pairs` - 表層形とエントリのペア
    ///
    /// # 戻り値
    ///
    /// 構築された辞書
    ///
    /// # エラー
    ///
    /// 表層形が重複している場合、エラーを返します。
    pub fn from_entries(mut pairs: Vec<(String, Entry)>) -> Result<Self> {
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let mut surfaces = Vec::with_capacity(pairs.len());
        let mut entries = Vec::with_capacity(pairs.len());
        for (surface, entry) in pairs {
            surfaces.push(surface);
            entries.push(entry);
        }
        let trie = if surfaces.is_empty() {
            None
        } else {
            let records: Vec<(&String, u32)> = surfaces
                .iter()
                .enumerate()
                .map(|(i, s)| (s, u32::try_from(i).unwrap()))
                .collect();
            Some(Trie::from_records(&records)?)
        };
        Ok(Self {
            surfaces,
            entries,
            trie,
        })
    }

    /// エントリ数を返します。
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 辞書が空かどうかを返します。
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 指定された添字の表層形を返します。
    ///
    /// 添字はトライの値と対応します。
    #[inline(always)]
    pub fn surface(&self, i: usize) -> &str {
        &self.surfaces[i]
    }

    /// 入力の接頭辞に一致するエントリを列挙するイテレータを返します。
    ///
    /// 文の位置 `p` から始まるすべての一致を列挙するには、
    /// `common_prefix_iterator(&sent.chars()[p..])` を呼び出します。
    ///
    /// # 引数
    ///
    /// * `suffix` - 検索開始位置以降の文字列
    #[inline(always)]
    pub fn common_prefix_iterator<'a>(
        &'a self,
        suffix: &'a [char],
    ) -> impl Iterator<Item = DictMatch<'a>> + 'a {
        self.trie
            .iter()
            .flat_map(move |trie| trie.common_prefix_iterator(suffix))
            .map(move |m| DictMatch {
                end_char: m.end_char,
                entry: &self.entries[m.value as usize],
            })
    }

    /// 入力と完全一致するエントリを返します。
    ///
    /// # 引数
    ///
    /// * `key` - 検索する表層形の文字列
    ///
    /// # 戻り値
    ///
    /// 一致するエントリが存在する場合は`Some(&Entry)`、
    /// 存在しない場合は`None`。
    #[inline(always)]
    pub fn exact_match(&self, key: &[char]) -> Option<&Entry> {
        self.trie
            .as_ref()
            .and_then(|trie| trie.exact_match(key))
            .map(|v| &self.entries[v as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_entry(tags: &[(&str, f64)], source_mask: u8) -> Entry {
        Entry::Word(WordEntry {
            level_tags: vec![tags.iter().map(|(t, w)| (t.to_string(), *w)).collect()],
            source_mask,
        })
    }

    #[test]
    fn test_exact_match() {
        let dict = Dictionary::from_entries(vec![
            ("cat".to_string(), word_entry(&[("K AE T", 5.0)], 1)),
            ("ca".to_string(), word_entry(&[("K AH", 1.0)], 2)),
        ])
        .unwrap();

        let key: Vec<char> = "cat".chars().collect();
        let entry = dict.exact_match(&key).unwrap();
        assert_eq!(entry.tags(0), &[("K AE T".to_string(), 5.0)]);
        assert_eq!(entry.source_mask(), 1);
        assert!(entry.tags(1).is_empty());

        let absent: Vec<char> = "dog".chars().collect();
        assert!(dict.exact_match(&absent).is_none());
    }

    #[test]
    fn test_matches_at_position() {
        // 文中の部分文字列としてキーが現れる位置で、(長さ, エントリ) が
        // 列挙されること。
        let dict = Dictionary::from_entries(vec![
            ("言語".to_string(), word_entry(&[("ゲンゴ", 1.0)], 1)),
            ("言語処理".to_string(), word_entry(&[("ゲンゴショリ", 1.0)], 1)),
        ])
        .unwrap();

        let sent: Vec<char> = "自然言語処理".chars().collect();
        let matches: Vec<(usize, &Entry)> = dict
            .common_prefix_iterator(&sent[2..])
            .map(|m| (m.end_char, m.entry))
            .collect();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].0, 2);
        assert_eq!(matches[1].0, 4);

        assert_eq!(dict.common_prefix_iterator(&sent[0..]).count(), 0);
    }

    #[test]
    fn test_empty_dictionary() {
        let dict = Dictionary::from_entries(vec![]).unwrap();
        assert!(dict.is_empty());
        let key: Vec<char> = "a".chars().collect();
        assert!(dict.exact_match(&key).is_none());
        assert_eq!(dict.common_prefix_iterator(&key).count(), 0);
    }

    #[test]
    fn test_subword_entry() {
        let entry = Entry::Subword(SubwordEntry {
            level_tags: vec![vec![("タ".to_string(), -0.5)]],
        });
        assert_eq!(entry.source_mask(), 0);
        assert_eq!(entry.tags(0).len(), 1);
    }
}
