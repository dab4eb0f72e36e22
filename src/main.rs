use std::sync::Arc;

use anyhow::Result;
use clap::{Arg, Command};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xpulse_trade_optimizer::adapters::{BundleRelay, ChainClient, CompetitorFeed};
use xpulse_trade_optimizer::core::OptimizerEngine;
use xpulse_trade_optimizer::mocks::{
    is_mock_mode, MockBundleRelay, MockChainClient, MockCompetitorFeed,
};
use xpulse_trade_optimizer::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let matches = Command::new("xpulse-trade-optimizer")
        .version("0.1.0")
        .author("xPulse Team <team@xpulse.dev>")
        .about("📈 크로스체인 기회 탐색 에이전트의 시장 최적화 & 위험 관리 엔진")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("설정 파일 경로 (없으면 기본 설정 사용)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("로그 레벨 (trace, debug, info, warn, error)")
                .default_value("info"),
        )
        .arg(
            Arg::new("mock")
                .long("mock")
                .help("모의 모드 (외부 체인 연결 없이 mock 어댑터 사용)")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    // 로깅 초기화
    let log_level = matches.get_one::<String>("log-level").unwrap();
    let log_filter = match log_level.as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    // 설정 로드
    let config = match matches.get_one::<String>("config") {
        Some(path) => {
            info!("📋 설정 파일 로드 중: {}", path);
            Config::load(path).await?
        }
        None => {
            info!("📋 기본 설정 사용");
            Config::default()
        }
    };
    if let Err(e) = config.validate() {
        error!("❌ 설정 검증 실패: {}", e);
        std::process::exit(1);
    }
    info!("✅ 설정 로드 완료");
    let config = Arc::new(config);

    // 어댑터 구성 — 현재 바이너리는 mock 어댑터만 번들한다.
    // 실제 체인/릴레이 연결은 이 엔진을 임베드하는 실행 레이어가 주입한다.
    if !matches.get_flag("mock") && !is_mock_mode() {
        warn!("⚠️ 실체인 어댑터가 구성되지 않아 mock 모드로 전환합니다 (API_MODE=mock)");
    }
    let chain_client: Arc<dyn ChainClient> = Arc::new(MockChainClient::new());
    let relay: Arc<dyn BundleRelay> = Arc::new(MockBundleRelay::new());
    let competitor_feed: Arc<dyn CompetitorFeed> = Arc::new(MockCompetitorFeed::new());

    // 엔진 시작
    let engine = Arc::new(OptimizerEngine::new(
        Arc::clone(&config),
        chain_client,
        relay,
        competitor_feed,
    ));
    engine.start().await?;
    info!("🎯 최적화 엔진이 성공적으로 시작되었습니다!");

    // 종료 신호 대기
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("🛑 종료 신호 수신됨, 안전하게 종료 중...");
            engine.stop().await;
        }
        Err(e) => {
            error!("❌ 신호 처리 오류: {}", e);
            engine.stop().await;
        }
    }

    info!("✅ 엔진이 안전하게 종료되었습니다.");
    Ok(())
}

fn print_banner() {
    println!(
        r#"
    ╔══════════════════════════════════════════════════════════════╗
    ║                                                              ║
    ║  📈 xPulse Trade Optimizer v0.1.0                            ║
    ║                                                              ║
    ║  크로스체인 기회 탐색을 위한 시장 최적화 & 위험 관리 엔진      ║
    ║                                                              ║
    ║  🎯 핵심 모듈:                                               ║
    ║     • 동적 슬리피지 / 가스 가격 계산                          ║
    ║     • 시장 체제 분류 (calm/normal/volatile/congested)        ║
    ║     • 서킷 브레이커 기반 위험 관리                            ║
    ║     • 토큰 충돌 없는 원자적 번들 구성                         ║
    ║                                                              ║
    ║  🛡️ 안전 장치:                                              ║
    ║     • 파라미터 경계 검증 (공개 전 필수)                       ║
    ║     • 운영자 수동 오버라이드                                  ║
    ║     • 실패 대응 폴백 테이블                                   ║
    ║                                                              ║
    ╚══════════════════════════════════════════════════════════════╝
    "#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_display() {
        print_banner();
    }

    #[test]
    fn test_cli_argument_parsing() {
        let args = vec![
            "xpulse-trade-optimizer",
            "--config",
            "test_config.toml",
            "--log-level",
            "debug",
            "--mock",
        ];

        let matches = Command::new("xpulse-trade-optimizer")
            .arg(Arg::new("config").long("config").value_name("FILE"))
            .arg(
                Arg::new("log-level")
                    .long("log-level")
                    .value_name("LEVEL")
                    .default_value("info"),
            )
            .arg(Arg::new("mock").long("mock").action(clap::ArgAction::SetTrue))
            .try_get_matches_from(args)
            .unwrap();

        assert_eq!(matches.get_one::<String>("config").unwrap(), "test_config.toml");
        assert_eq!(matches.get_one::<String>("log-level").unwrap(), "debug");
        assert!(matches.get_flag("mock"));
    }
}
