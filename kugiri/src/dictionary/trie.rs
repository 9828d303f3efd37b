//! トライ構造による高速文字列検索
//!
//! このモジュールは、ダブル配列トライを使用した高速な文字列検索機能を
//! 提供します。crawdadクレートの`Trie`実装をラップしています。

use bincode::{
    de::{BorrowDecode, BorrowDecoder, Decoder},
    enc::Encoder,
    error::{DecodeError, EncodeError},
    Decode, Encode,
};

use crate::errors::KugiriError;

/// ダブル配列トライ
pub struct Trie {
    /// ダブル配列トライの内部実装
    da: crawdad::Trie,
}

impl Encode for Trie {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        Encode::encode(&self.da.serialize_to_vec(), encoder)?;
        Ok(())
    }
}

impl<Context> Decode<Context> for Trie {
    fn decode<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
        let data: Vec<u8> = Decode::decode(decoder)?;
        let (da, _) = crawdad::Trie::deserialize_from_slice(&data);
        Ok(Self { da })
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for Trie {
    fn borrow_decode<D: BorrowDecoder<'de>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let data: &[u8] = BorrowDecode::borrow_decode(decoder)?;
        let (da, _) = crawdad::Trie::deserialize_from_slice(data);
        Ok(Self { da })
    }
}

impl Trie {
    /// レコードからトライを構築します。
    ///
    /// キーは一意でなければなりません。
    pub fn from_records<K>(records: &[(K, u32)]) -> Result<Self, KugiriError>
    where
        K: AsRef<str>,
    {
        Ok(Self {
            da: crawdad::Trie::from_records(records.iter().map(|(k, v)| (k, *v)))
                .map_err(|e| KugiriError::invalid_argument("records", e.to_string()))?,
        })
    }

    /// 入力の接頭辞に一致するキーを列挙するイテレータを返します。
    #[inline(always)]
    pub fn common_prefix_iterator<'a>(
        &'a self,
        input: &'a [char],
    ) -> impl Iterator<Item = TrieMatch> + 'a {
        self.da
            .common_prefix_search(input.iter().cloned())
            .map(move |(value, end_char)| TrieMatch::new(value, end_char))
    }

    /// 入力と完全一致するキーの値を返します。
    #[inline(always)]
    pub fn exact_match(&self, input: &[char]) -> Option<u32> {
        self.da.exact_match(input.iter().cloned())
    }
}

/// トライマッチング結果
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct TrieMatch {
    /// 一致したキーの値
    pub value: u32,

    /// 一致終了位置（文字単位）
    pub end_char: usize,
}

impl TrieMatch {
    /// 新しい `TrieMatch` インスタンスを作成します。
    #[inline(always)]
    pub const fn new(value: u32, end_char: usize) -> Self {
        Self { value, end_char }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_prefix() {
        let records = [("東京", 0u32), ("東京都", 1u32)];
        let trie = Trie::from_records(&records).unwrap();
        let input: Vec<char> = "東京都に".chars().collect();
        let matches: Vec<TrieMatch> = trie.common_prefix_iterator(&input).collect();
        assert_eq!(
            matches,
            vec![TrieMatch::new(0, 2), TrieMatch::new(1, 3)]
        );
    }

    #[test]
    fn test_exact_match() {
        let records = [("ab", 7u32), ("abc", 8u32)];
        let trie = Trie::from_records(&records).unwrap();
        assert_eq!(trie.exact_match(&['a', 'b']), Some(7));
        assert_eq!(trie.exact_match(&['a', 'b', 'c']), Some(8));
        assert_eq!(trie.exact_match(&['a']), None);
    }

    #[test]
    fn test_serialization_round_trip() {
        let records = [("ab", 0u32), ("cd", 1u32)];
        let trie = Trie::from_records(&records).unwrap();
        let config = crate::common::bincode_config();
        let bytes = bincode::encode_to_vec(&trie, config).unwrap();
        let (reloaded, _): (Trie, usize) =
            bincode::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(reloaded.exact_match(&['a', 'b']), Some(0));
        assert_eq!(reloaded.exact_match(&['c', 'd']), Some(1));
    }
}
