use anyhow::{Context, Result, bail};
use butter_fetch::{
    AppConfig, CallbackQueue, GroupedResults, SearchOrchestrator, SearchService, format_found,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "butterfetch.toml";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("butter_fetch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(|s| s.as_str());

    match command {
        Some("search") | Some("image") => {}
        Some("--help") | Some("-h") | None => {
            print_help();
            return Ok(());
        }
        Some(other) => {
            println!("未知命令: {}", other);
            print_help();
            return Ok(());
        }
    }

    let config = AppConfig::load(CONFIG_FILE)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.limits.max_workers.max(1))
        .enable_all()
        .build()
        .context("無法建立 tokio runtime")?;

    let engine = Arc::new(SearchOrchestrator::new(&config)?);
    let (mut queue, sender) = CallbackQueue::new();
    let service = SearchService::new(runtime.handle().clone(), engine, sender);

    let outcome = match (command, &args[2..]) {
        (Some("search"), [keyword, ..]) => run_search(&service, &mut queue, keyword).map(|grouped| print_results(&grouped)),
        (Some("image"), [keyword, index, out, ..]) => {
            let index: usize = index.parse().with_context(|| format!("索引必須是數字: {}", index))?;
            run_image(&service, &mut queue, keyword, index, PathBuf::from(out))
        }
        _ => {
            print_help();
            Ok(())
        }
    };

    service.shutdown();
    outcome
}

fn spinner(message: String) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn run_search(service: &SearchService, queue: &mut CallbackQueue, keyword: &str) -> Result<GroupedResults> {
    let pb = spinner(format!("🔍 搜尋中: {}", keyword))?;

    let (tx, rx) = mpsc::channel();
    service.search(keyword, move |grouped| {
        let _ = tx.send(grouped);
    });

    if !queue.run_next() {
        pb.finish_and_clear();
        bail!("搜尋任務沒有回應");
    }
    pb.finish_and_clear();
    rx.try_recv().context("搜尋沒有回傳結果")
}

fn print_results(grouped: &GroupedResults) {
    let all = grouped.all();

    for (label, start, len) in grouped.group_labels() {
        println!("\n[{}]", label);
        for (offset, result) in all[start..start + len].iter().enumerate() {
            let mark = if result.from_sniffing { " 🔗" } else { "" };
            println!("  {:>2}. {} ({}){}", start + offset, result.title, result.id, mark);
            println!("      {}", result.url);
        }
    }

    for error in &grouped.errors {
        println!("⚠️  {}", error);
    }

    println!("\n{}", format_found(grouped.total_count(), grouped.sniffed_count()));
}

fn run_image(
    service: &SearchService,
    queue: &mut CallbackQueue,
    keyword: &str,
    index: usize,
    out: PathBuf,
) -> Result<()> {
    let grouped = run_search(service, queue, keyword)?;
    let Some(result) = grouped.all().get(index).map(|r| (*r).clone()) else {
        bail!("索引超出範圍: {}（共 {} 筆）", index, grouped.total_count());
    };

    let pb = spinner(format!("🖼️  載入圖片: {}", result.title))?;
    let (tx, rx) = mpsc::channel();
    let failure_tx = tx.clone();

    service.load_image(
        result,
        move |image| {
            let _ = tx.send(Some(image));
        },
        move || {
            let _ = failure_tx.send(None);
        },
    );

    if !queue.run_next() {
        pb.finish_and_clear();
        bail!("圖片任務沒有回應");
    }
    pb.finish_and_clear();

    match rx.try_recv().context("圖片沒有回傳結果")? {
        Some(image) => {
            image
                .save(&out)
                .with_context(|| format!("無法寫入圖片: {}", out.display()))?;
            println!("✅ 已儲存 {}x{} → {}", image.width(), image.height(), out.display());
            Ok(())
        }
        None => bail!("無法載入圖片"),
    }
}

fn print_help() {
    println!("ButterFetch - DLsite / FANZA / VNDB 聚合搜尋\n");
    println!("用法:");
    println!("  butter-fetch search <關鍵字>                 # 搜尋三個來源");
    println!("  butter-fetch image <關鍵字> <索引> <out.png>  # 下載第 N 筆結果的封面");
    println!("  butter-fetch --help                          # 顯示此幫助\n");
    println!("設定:");
    println!("  ./{}                          # 選用設定檔", CONFIG_FILE);
    println!("  BUTTERFETCH_LIMITS__MAX_RESULTS=10           # 環境變數覆寫");
    println!("  RUST_LOG=butter_fetch=debug                  # 日誌等級");
}
