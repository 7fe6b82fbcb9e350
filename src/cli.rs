use card_catalog_common::{CardDraft, CardField, ReconciledResult};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "card-catalog")]
#[command(about = "スポーツカード画像認識・コレクション管理ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// データフォルダ（設定より優先）
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

/// カード項目の入力
#[derive(clap::Args, Debug, Default, Clone)]
pub struct CardFieldArgs {
    /// 選手名
    #[arg(long)]
    pub player: Option<String>,

    /// 年
    #[arg(long)]
    pub year: Option<u32>,

    /// ブランド
    #[arg(long)]
    pub brand: Option<String>,

    /// シリーズ
    #[arg(long)]
    pub series: Option<String>,

    /// チーム
    #[arg(long)]
    pub team: Option<String>,

    /// カード番号
    #[arg(long)]
    pub card_number: Option<String>,

    /// シリアル番号
    #[arg(long)]
    pub serial: Option<String>,

    /// メモ
    #[arg(long)]
    pub notes: Option<String>,

    /// ルーキーカード
    #[arg(long)]
    pub rookie: bool,

    /// サイン入り
    #[arg(long)]
    pub autographed: bool,
}

impl CardFieldArgs {
    /// 指定された項目だけを上書き
    pub fn apply_to(&self, draft: &mut CardDraft) {
        if let Some(player) = &self.player {
            draft.player_name = player.clone();
        }
        if let Some(year) = self.year {
            draft.year = year;
        }
        if let Some(brand) = &self.brand {
            draft.brand = brand.clone();
        }
        if let Some(series) = &self.series {
            draft.card_series = Some(series.clone());
        }
        if let Some(team) = &self.team {
            draft.team = team.clone();
        }
        if let Some(number) = &self.card_number {
            draft.card_number = Some(number.clone());
        }
        if let Some(serial) = &self.serial {
            draft.serial_number = Some(serial.clone());
        }
        if let Some(notes) = &self.notes {
            draft.notes = Some(notes.clone());
        }
        if self.rookie {
            draft.is_rookie_card = true;
        }
        if self.autographed {
            draft.is_autographed = true;
        }
    }

    /// 認識結果を初期値にして入力値で上書きした登録内容
    pub fn to_draft(&self, recognized: Option<&ReconciledResult>) -> CardDraft {
        let mut draft = CardDraft::default();

        if let Some(result) = recognized.filter(|r| r.success()) {
            if let Some(fields) = result.fields() {
                let value = |field| fields.get(field).map(|fc| fc.value().to_string());
                draft.player_name = value(CardField::PlayerName).unwrap_or_default();
                draft.year = value(CardField::Year)
                    .and_then(|y| y.trim().parse().ok())
                    .unwrap_or_default();
                draft.brand = value(CardField::Brand).unwrap_or_default();
                draft.card_series = value(CardField::CardSeries);
            }
            draft.recognition_confidence = Some(result.overall_confidence());
        }

        self.apply_to(&mut draft);
        draft
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// カード画像（またはフォルダ）を認識
    Recognize {
        /// 画像ファイルまたはフォルダ
        #[arg(required = true)]
        path: PathBuf,

        /// JSONで出力
        #[arg(long)]
        json: bool,

        /// キャッシュを使用（再認識をスキップ）
        #[arg(long)]
        use_cache: bool,

        /// サブフォルダも再帰的にスキャン
        #[arg(short = 'r', long)]
        recursive: bool,
    },

    /// カードを登録（画像認識結果を初期値に使用）
    Add {
        /// カード画像
        #[arg(required = true)]
        image: PathBuf,

        #[command(flatten)]
        fields: CardFieldArgs,

        /// 画像認識をせず入力値のみで登録
        #[arg(long)]
        no_recognize: bool,
    },

    /// カードを検索
    Search {
        /// 検索語（選手名・ブランド・シリーズ・チーム・番号・メモ）
        #[arg(short, long)]
        term: Option<String>,

        #[arg(long)]
        team: Option<String>,

        #[arg(long)]
        year: Option<u32>,

        #[arg(long)]
        brand: Option<String>,

        #[arg(long)]
        series: Option<String>,

        #[arg(long)]
        player: Option<String>,

        /// ルーキーカードのみ
        #[arg(long)]
        rookie: bool,

        /// サイン入りのみ
        #[arg(long)]
        autographed: bool,

        /// ページ番号（1始まり）
        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "20")]
        page_size: usize,
    },

    /// カードの詳細を表示
    Show {
        #[arg(required = true)]
        id: String,
    },

    /// カードを編集（指定した項目のみ変更）
    Edit {
        #[arg(required = true)]
        id: String,

        #[command(flatten)]
        fields: CardFieldArgs,
    },

    /// カードを削除
    Delete {
        #[arg(required = true)]
        id: String,

        /// 確認をスキップ
        #[arg(short, long)]
        yes: bool,
    },

    /// JSONからカードを一括インポート
    Import {
        /// インポートするJSONファイル（BulkImportCardの配列）
        #[arg(required = true)]
        input: PathBuf,
    },

    /// 価格を記録
    Price {
        #[arg(required = true)]
        id: String,

        /// 価格（省略時は「取得できず」として記録）
        amount: Option<f64>,
    },

    /// 価格履歴を表示
    History {
        #[arg(required = true)]
        id: String,
    },

    /// 最近変更されたカード
    Recent {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// 価格変動の大きいカード
    Trends {
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// カタログをExcelに出力
    Export {
        /// 出力ファイル/ディレクトリ
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 設定を表示/編集
    Config {
        /// Gemini APIキーを設定
        #[arg(long)]
        set_gemini_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },

    /// キャッシュ管理
    Cache {
        /// キャッシュを削除
        #[arg(long)]
        clear: bool,

        /// 対象フォルダ（省略時はカレント）
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// キャッシュ情報を表示
        #[arg(long)]
        info: bool,
    },
}
