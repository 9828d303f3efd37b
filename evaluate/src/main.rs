//! モデルの精度を評価するユーティリティ
//!
//! このバイナリは、訓練済みの解析モデルの精度を評価します。
//! テストコーパスと比較して、単語分割の適合率（Precision）・再現率
//! （Recall）・F1スコアと、レベルごとのタグ付与精度を計算します。

use std::collections::HashSet;
use std::error::Error;
use std::fs::File;
use std::path::PathBuf;

use kugiri::trainer::Corpus;
use kugiri::{Analyzer, ModelBundle, Sentence};

use clap::Parser;

/// コマンドライン引数
#[derive(Parser, Debug)]
#[clap(name = "evaluate", about = "Evaluate the model accuracy")]
struct Args {
    /// Test corpus in the fully annotated format.
    #[clap(short = 't', long)]
    test_in: PathBuf,

    /// Model file (in zstd).
    #[clap(short = 'i', long)]
    model_in: PathBuf,
}

/// メイン関数
///
/// テストコーパスに対して解析器を実行し、正解データと比較して
/// 単語分割のF1スコアとタグ付与精度を計算します。
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    eprintln!("Loading the model...");
    let decoder = zstd::stream::Decoder::new(File::open(&args.model_in)?)?;
    let bundle = ModelBundle::read(decoder)?;
    let n_levels = bundle.levels.len();
    let analyzer = Analyzer::new(bundle);

    eprintln!("Loading the test corpus...");
    let corpus = Corpus::from_reader(File::open(&args.test_in)?)?;

    let mut num_ref = 0;
    let mut num_sys = 0;
    let mut num_cor = 0;
    let mut num_tag_ref = vec![0usize; n_levels];
    let mut num_tag_cor = vec![0usize; n_levels];

    for example in corpus.iter() {
        let mut sent = Sentence::new();
        sent.set_sentence(example.sentence().raw());
        analyzer.analyze(&mut sent);

        // 単語は (開始位置, 終了位置) の組で比較する。
        let refs: HashSet<(usize, usize)> = example
            .sentence()
            .words()
            .iter()
            .map(|w| (w.range_char().start, w.range_char().end))
            .collect();
        let syss: HashSet<(usize, usize)> = sent
            .words()
            .iter()
            .map(|w| (w.range_char().start, w.range_char().end))
            .collect();
        num_ref += refs.len();
        num_sys += syss.len();
        num_cor += refs.intersection(&syss).count();

        // タグは分割が一致した単語についてのみ比較する。
        for (gold, word) in example.words().iter().zip(example.sentence().words()) {
            let range = (word.range_char().start, word.range_char().end);
            if !syss.contains(&range) {
                continue;
            }
            let sys_word = sent
                .words()
                .iter()
                .find(|w| (w.range_char().start, w.range_char().end) == range)
                .unwrap();
            for lev in 0..n_levels {
                let Some(gold_tag) = gold.tag(lev) else {
                    continue;
                };
                num_tag_ref[lev] += 1;
                if sys_word.best_tag(lev).map(|t| t.name()) == Some(gold_tag) {
                    num_tag_cor[lev] += 1;
                }
            }
        }
    }

    let precision = num_cor as f64 / num_sys as f64;
    let recall = num_cor as f64 / num_ref as f64;
    let f1 = 2.0 * precision * recall / (precision + recall);
    println!("Word precision: {:.4} ({} / {})", precision, num_cor, num_sys);
    println!("Word recall: {:.4} ({} / {})", recall, num_cor, num_ref);
    println!("Word F1: {:.4}", f1);

    for lev in 0..n_levels {
        let accuracy = if num_tag_ref[lev] == 0 {
            0.0
        } else {
            num_tag_cor[lev] as f64 / num_tag_ref[lev] as f64
        };
        println!(
            "Tag accuracy (level {}): {:.4} ({} / {})",
            lev, accuracy, num_tag_cor[lev], num_tag_ref[lev],
        );
    }

    Ok(())
}
