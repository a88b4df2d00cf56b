// OpenTerm - SSH 终端 + SFTP 文件传输客户端
// 应用入口：命令行参数、日志、运行时和前台事件循环

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use openterm::models::settings::AppSettings;
use openterm::services::cache::LocalCache;
use openterm::services::storage;
use openterm::ssh::{AuthMethod, RusshConnector, SshConfig};
use openterm::state::{SessionController, TaskScheduler, UiEvent, UiSender};

/// 交互式 SSH 终端，附带 SFTP 文件浏览与传输
#[derive(Parser, Debug)]
#[command(name = "openterm")]
#[command(version, about, long_about = None)]
struct Cli {
    /// 远程主机
    host: String,

    /// 端口（默认取设置中的 default_port）
    #[arg(short, long)]
    port: Option<u16>,

    /// 用户名（默认取 $USER）
    #[arg(short, long)]
    user: Option<String>,

    /// 私钥文件；不指定时使用密码认证
    #[arg(short, long, value_name = "FILE")]
    identity: Option<PathBuf>,
}

const HELP: &str = "\
Commands:
  :ls [path]      list the current or given remote directory
  :cd <path>      change remote directory
  :get <name>     download a file into the local cache
  :open <name>    download a file and open it
  :put <path>     upload a local file or directory
  :downloads      show cached downloads
  :downloads open <name>
                  open a cached download without connecting
  :clear          clear the download cache
  :help           show this help
  :quit           disconnect and exit
Anything else is sent to the remote shell.
";

fn main() -> Result<()> {
    // 可以通过 RUST_LOG 环境变量控制日志级别；日志写到 stderr，避免和终端输出混在一起
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = load_or_init_settings();

    let user = match cli.user.clone() {
        Some(user) => user,
        None => std::env::var("USER").context("No --user given and $USER is not set")?,
    };
    let auth = match cli.identity.clone() {
        Some(key_path) => AuthMethod::PublicKey {
            key_path,
            passphrase: std::env::var("OPENTERM_PASSPHRASE").ok(),
        },
        None => AuthMethod::Password(read_password(&user, &cli.host)?),
    };
    let port = cli.port.unwrap_or(settings.connection.default_port);
    let config = SshConfig::new(cli.host, port, user, auth, &settings);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("ssh-worker")
        .build()
        .context("Failed to create the tokio runtime")?;

    runtime.block_on(run(settings, config))
}

/// 读取设置；首次运行时把默认设置写入配置目录，方便用户修改
fn load_or_init_settings() -> AppSettings {
    let exists = storage::get_settings_file()
        .map(|path| path.exists())
        .unwrap_or(true);
    let settings = storage::load_settings().unwrap_or_else(|e| {
        warn!("[Settings] Falling back to defaults: {:#}", e);
        AppSettings::default()
    });
    if !exists {
        match storage::save_settings(&settings) {
            Ok(()) => info!("[Settings] Wrote default settings"),
            Err(e) => warn!("[Settings] Could not write default settings: {:#}", e),
        }
    }
    settings
}

/// 密码优先取环境变量 OPENTERM_PASSWORD，否则从标准输入读一行
fn read_password(user: &str, host: &str) -> Result<String> {
    if let Ok(password) = std::env::var("OPENTERM_PASSWORD") {
        return Ok(password);
    }

    print!("{}@{}'s password: ", user, host);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn run(settings: AppSettings, config: SshConfig) -> Result<()> {
    let (ui, mut events) = UiSender::channel();
    let scheduler = TaskScheduler::current(ui);
    let cache = LocalCache::new(settings.sftp.cache_root());
    let mut controller =
        SessionController::new(settings, scheduler, Arc::new(RusshConnector), cache);

    controller.connect(config);
    print!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                controller.apply(&event);
                render(&event, &controller);
            }
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => {
                        if !dispatch(&controller, &line) {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    if let Some(handle) = controller.disconnect() {
        let _ = handle.await;
    }
    while let Ok(event) = events.try_recv() {
        controller.apply(&event);
        render(&event, &controller);
    }
    Ok(())
}

/// 处理一行输入，返回 false 表示退出
fn dispatch(controller: &SessionController, line: &str) -> bool {
    let Some(command) = line.strip_prefix(':') else {
        controller.send_command(line);
        return true;
    };

    let (name, arg) = match command.split_once(' ') {
        Some((name, arg)) => (name, arg.trim()),
        None => (command.trim(), ""),
    };

    match (name, arg) {
        ("quit" | "q", _) => return false,
        ("help", _) => print!("{}", HELP),
        ("ls", "") => {
            controller.refresh();
        }
        ("ls" | "cd", path) if !path.is_empty() => {
            controller.navigate(path);
        }
        ("get" | "open", file) if !file.is_empty() => {
            match controller
                .listing()
                .entries
                .iter()
                .find(|e| e.raw_name == file && !e.is_directory)
            {
                Some(entry) if name == "get" => {
                    controller.download(entry);
                }
                Some(entry) => {
                    controller.open_remote_file(entry);
                }
                None => println!("No such file in {}: {}", controller.current_path(), file),
            }
        }
        ("put", path) if !path.is_empty() => {
            controller.upload(path);
        }
        ("downloads", "") => {
            controller.download_list();
        }
        ("downloads", rest) => match rest.split_once(' ') {
            Some(("open", file)) if !file.trim().is_empty() => {
                controller.open_cached(file.trim());
            }
            _ => println!("Usage: :downloads open <name>"),
        },
        ("clear", _) => {
            controller.clear_cache();
        }
        _ => println!("Unknown command :{} (try :help)", command),
    }
    true
}

fn render(event: &UiEvent, controller: &SessionController) {
    match event {
        UiEvent::Output(text) => print!("{}", text),
        UiEvent::Connection(state) => println!("-- {} --", state),
        UiEvent::ConnectionInfo { host, port, user } => {
            println!("-- {}@{}:{} --", user, host, port)
        }
        UiEvent::Listing(listing) => {
            println!("{}:", listing.path);
            for entry in &listing.entries {
                println!(
                    "  {} {:>10}  {}  {}",
                    entry.permissions, entry.size, entry.modified, entry.display_name
                );
            }
        }
        UiEvent::TaskAdded(task) => println!(
            "[{}] {} ({})",
            task.status.display_text(),
            task.file_name,
            task.size
        ),
        UiEvent::TaskUpdated(task) => {
            if let Some(error) = &task.error {
                println!("[{}] {}: {}", task.status.display_text(), task.file_name, error);
            } else {
                println!(
                    "[{}] {} {:.0}%",
                    task.status.display_text(),
                    task.file_name,
                    task.progress * 100.0
                );
            }
        }
        UiEvent::TaskList(tasks) => {
            println!("Downloads in {}:", controller.cache().root().display());
            for task in tasks {
                println!(
                    "  [{}] {} ({}) {:.0}%",
                    task.status.display_text(),
                    task.file_name,
                    task.size,
                    task.progress * 100.0
                );
            }
        }
    }
    let _ = std::io::stdout().flush();
}
