//! モデル訓練ユーティリティ
//!
//! このバイナリは、完全アノテーション形式のコーパスと任意個の外部辞書から
//! 解析モデルを訓練し、zstd圧縮されたモデルファイルとして保存します。

use std::fs::File;
use std::io;
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use kugiri::errors::KugiriError;
use kugiri::trainer::{read_dictionary_entries, Corpus, Trainer};
use kugiri::ModelConfig;

/// コマンドライン引数
///
/// モデルを訓練するために必要な入力ファイルと訓練パラメータを指定します。
#[derive(Parser, Debug)]
#[clap(name = "train", about = "Model trainer")]
struct Args {
    /// Fully annotated corpus file. Each line is a sentence of
    /// space-separated `surface/tag1/tag2/...` tokens.
    #[clap(short = 't', long)]
    corpus: PathBuf,

    /// External dictionary files with one `surface/tag1/...` entry per line.
    /// The i-th dictionary is assigned source bit i+1.
    #[clap(short = 'd', long)]
    dict: Vec<PathBuf>,

    /// Skips external dictionaries that fail to parse instead of aborting.
    #[clap(long)]
    optional_dicts: bool,

    /// A file to which the model is output. The file is compressed by zstd.
    #[clap(short = 'o', long)]
    model_out: PathBuf,

    /// Number of tagging levels.
    #[clap(long, default_value = "1")]
    levels: u8,

    /// Maximum order of character n-grams.
    #[clap(long, default_value = "3")]
    char_n: u8,

    /// Window size of character n-grams.
    #[clap(long, default_value = "3")]
    char_window: u8,

    /// Maximum order of character-type n-grams.
    #[clap(long, default_value = "3")]
    type_n: u8,

    /// Window size of character-type n-grams.
    #[clap(long, default_value = "3")]
    type_window: u8,

    /// Cap of the dictionary match length bucket.
    #[clap(long, default_value = "4")]
    dict_n: u8,

    /// Beam width of the unknown word candidate search.
    #[clap(long, default_value = "50")]
    unk_beam_size: u16,

    /// Maximum number of unknown word tag candidates.
    #[clap(long, default_value = "3")]
    unk_max_tags: u8,

    /// Cost parameter C of the linear model solver.
    #[clap(long, default_value = "1.0")]
    cost: f64,

    /// Tolerance of the termination criterion of the solver.
    #[clap(long, default_value = "0.01")]
    epsilon: f64,
}

/// 訓練処理中に発生する可能性のあるエラー
#[derive(Debug, Error)]
enum TrainError {
    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 訓練処理エラー
    #[error("Training process failed: {0}")]
    Kugiri(#[from] KugiriError),
}

/// 訓練コマンドを実行する
///
/// コーパスと外部辞書からモデルを訓練し、zstd圧縮して保存します。
///
/// # 引数
///
/// * `args` - 訓練コマンドの引数
///
/// # エラー
///
/// ファイルの読み書きや訓練処理に失敗した場合、`TrainError`を返します。
fn run(args: Args) -> Result<(), TrainError> {
    let config = ModelConfig {
        char_n: args.char_n,
        char_window: args.char_window,
        type_n: args.type_n,
        type_window: args.type_window,
        dict_n: args.dict_n,
        n_levels: args.levels,
        unk_beam_size: args.unk_beam_size,
        unk_max_tags: args.unk_max_tags,
        ..Default::default()
    };

    println!("Loading the corpus...");
    let corpus = Corpus::from_reader(File::open(&args.corpus)?)?;

    let mut dictionaries = vec![];
    for path in &args.dict {
        println!("Loading the dictionary {}...", path.display());
        match read_dictionary_entries(File::open(path)?) {
            Ok(entries) => dictionaries.push(entries),
            Err(e) if args.optional_dicts => {
                eprintln!("Skipping {}: {}", path.display(), e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("Starting model training...");
    let trainer = Trainer::new(config)?.cost(args.cost).epsilon(args.epsilon);
    let bundle = trainer.train(corpus, dictionaries)?;

    println!("Writing model to {}...", args.model_out.display());
    let file = File::create(&args.model_out)?;
    let mut encoder = zstd::stream::Encoder::new(file, 19)?;
    bundle.write(&mut encoder)?;
    encoder.finish()?;

    println!("Successfully trained and wrote the model.");
    Ok(())
}

fn main() -> Result<(), TrainError> {
    run(Args::parse())
}
