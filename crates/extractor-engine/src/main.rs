//! Order history extractor CLI.

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use extractor_core::{init_logging, ExtractionRequest, LogConfig, LogFormat};
use extractor_engine::{extract, ExtractError, ExtractorConfig};
use extractor_exchange::{BitgetClient, BitgetConfig};

#[derive(Parser)]
#[command(name = "order-extractor")]
#[command(about = "Time-budgeted Bitget order history extractor", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// 로그 형식 (pretty, json, compact). 미지정 시 LOG_FORMAT 환경변수 사용
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// 심볼 하나의 주문 이력 추출 (결과는 stdout에 JSON으로 출력)
    Extract {
        /// 기본 심볼 (예: BTCUSDT)
        #[arg(long)]
        symbol: String,

        /// 시작 시각 (epoch 밀리초 또는 초)
        #[arg(long)]
        start_ms: Option<i64>,

        /// 종료 시각 (epoch 밀리초 또는 초)
        #[arg(long)]
        end_ms: Option<i64>,

        /// spot 스트림 제외
        #[arg(long)]
        no_spot: bool,

        /// futures 스트림 제외
        #[arg(long)]
        no_futures: bool,

        /// 최대 실행 시간 (초). 미지정 시 MAX_EXECUTION_TIME 사용
        #[arg(long)]
        max_execution_secs: Option<u64>,
    },

    /// 환경변수로부터 읽은 설정 출력
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::new(cli.log_level.as_str()).with_env_format();
    if let Some(format) = cli.log_format {
        log_config = log_config.with_format(format);
    }
    init_logging(log_config).map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    let config = ExtractorConfig::from_env()?;
    tracing::debug!(?config, "설정 로드 완료");

    match cli.command {
        Commands::Extract {
            symbol,
            start_ms,
            end_ms,
            no_spot,
            no_futures,
            max_execution_secs,
        } => {
            let bitget = BitgetConfig::from_env().ok_or_else(|| {
                ExtractError::Config(
                    "BITGET_API_KEY, BITGET_API_SECRET, BITGET_API_PASSPHRASE 환경변수가 필요합니다"
                        .to_string(),
                )
            })?;
            let client = BitgetClient::new(bitget.with_timeout_secs(config.request_timeout_secs))
                .context("Bitget 클라이언트 생성 실패")?;

            let mut request = ExtractionRequest::new(symbol)
                .with_window(start_ms, end_ms)
                .with_spot(!no_spot)
                .with_futures(!no_futures);
            if let Some(secs) = max_execution_secs {
                request = request.with_max_execution_time(Duration::from_secs(secs));
            }

            let result = extract(&request, &config, &client).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
