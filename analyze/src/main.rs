//! 単語分割とタグ付与を実行するユーティリティ
//!
//! このバイナリは、標準入力から読み込んだテキストを1行1文として解析し、
//! 指定された出力形式（full、wakati、detail）で結果を出力します。

use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

use kugiri::{Analyzer, ModelBundle};

use clap::Parser;

/// 出力モード
#[derive(Clone, Debug)]
enum OutputMode {
    Full,
    Wakati,
    Detail,
}

/// `OutputMode` の `FromStr` 実装
impl FromStr for OutputMode {
    type Err = &'static str;

    /// 文字列から出力モードをパースする
    ///
    /// # 引数
    ///
    /// * `mode` - パース対象の文字列（"full"、"wakati"、"detail"のいずれか）
    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode {
            "full" => Ok(Self::Full),
            "wakati" => Ok(Self::Wakati),
            "detail" => Ok(Self::Detail),
            _ => Err("Could not parse a mode"),
        }
    }
}

/// コマンドライン引数
#[derive(Parser, Debug)]
#[clap(name = "analyze", about = "Predicts word boundaries and tags")]
struct Args {
    /// Model file (in zstd).
    #[clap(short = 'i', long)]
    model: PathBuf,

    /// Output mode. Choices are full, wakati, and detail.
    #[clap(short = 'O', long, default_value = "full")]
    output_mode: OutputMode,
}

/// メイン関数
///
/// モデルをロードし、標準入力から読み込んだテキストを解析して、
/// 指定された形式で結果を標準出力に出力します。
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    eprintln!("Loading the model...");
    let decoder = zstd::stream::Decoder::new(File::open(&args.model)?)?;
    let bundle = ModelBundle::read(decoder)?;
    let n_levels = bundle.levels.len();

    let analyzer = Analyzer::new(bundle);
    let mut worker = analyzer.new_worker();

    eprintln!("Ready to analyze");

    let is_tty = atty::is(atty::Stream::Stdout);

    let out = std::io::stdout();
    let mut out = BufWriter::new(out.lock());
    let lines = std::io::stdin().lock().lines();
    for line in lines {
        let line = line?;
        worker.reset_sentence(line);
        worker.analyze();
        match args.output_mode {
            OutputMode::Full => {
                for (i, word) in worker.word_iter().enumerate() {
                    if i != 0 {
                        out.write_all(b" ")?;
                    }
                    out.write_all(word.surface().as_bytes())?;
                    for lev in 0..n_levels {
                        out.write_all(b"/")?;
                        match word.best_tag(lev) {
                            Some(tag) => out.write_all(tag.name().as_bytes())?,
                            None => out.write_all(b"*")?,
                        }
                    }
                }
                out.write_all(b"\n")?;
                if is_tty {
                    out.flush()?;
                }
            }
            OutputMode::Wakati => {
                for (i, word) in worker.word_iter().enumerate() {
                    if i != 0 {
                        out.write_all(b" ")?;
                    }
                    out.write_all(word.surface().as_bytes())?;
                }
                out.write_all(b"\n")?;
                if is_tty {
                    out.flush()?;
                }
            }
            OutputMode::Detail => {
                for word in worker.word_iter() {
                    write!(&mut out, "{}\t{:?}", word.surface(), word.range_char())?;
                    for lev in 0..n_levels {
                        for tag in word.tags(lev) {
                            write!(&mut out, "\t{}:{:.4}", tag.name(), tag.score())?;
                        }
                    }
                    out.write_all(b"\n")?;
                }
                out.write_all(b"EOS\n")?;
                if is_tty {
                    out.flush()?;
                }
            }
        }
    }

    Ok(())
}
