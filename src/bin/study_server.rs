//! Companion launcher: serve a directory over local HTTP and open the study
//! page in the default browser. Press Enter (or Ctrl-C) to stop.

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Serve a flashcard study page on localhost and open it in the browser.
#[derive(Parser, Debug)]
#[command(name = "study-server", version, about)]
struct Cli {
    /// Directory to serve.
    #[arg(long, env = "SLIDECARDS_SERVE_DIR", default_value = ".")]
    dir: PathBuf,

    /// Port on 127.0.0.1.
    #[arg(long, env = "SLIDECARDS_PORT", default_value_t = 8000)]
    port: u16,

    /// Page opened in the browser, relative to --dir.
    #[arg(long, env = "SLIDECARDS_PAGE", default_value = "flashcards.html")]
    page: String,

    /// Do not launch a browser; just print the URL.
    #[arg(long)]
    no_open: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone)]
struct AppState {
    root: Arc<PathBuf>,
    page: Arc<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if cli.verbose { "debug" } else { "info" })
        }))
        .with_writer(io::stderr)
        .init();

    let root = cli
        .dir
        .canonicalize()
        .with_context(|| format!("Cannot serve {:?}", cli.dir))?;
    let page = cli.page.trim_start_matches('/').to_string();
    if !root.join(&page).is_file() {
        warn!("{} not found in {}", page, root.display());
    }

    let state = AppState {
        root: Arc::new(root.clone()),
        page: Arc::new(page.clone()),
    };
    let app = Router::new()
        .route("/", get(index))
        .fallback(serve_file)
        .with_state(state);

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, cli.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}; is another server using the port?"))?;

    let url = format!("http://{addr}/{page}");
    info!("Serving {} at http://{}", root.display(), addr);
    eprintln!("Study page: {url}");
    eprintln!("Press Enter to stop the server.");

    if !cli.no_open {
        if let Err(e) = open::that(&url) {
            warn!("Could not open a browser ({e}); open {url} manually");
        }
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Enter, end of stdin, or Ctrl-C.
async fn shutdown_signal() {
    let enter = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
    });
    tokio::select! {
        _ = enter => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

async fn index(State(state): State<AppState>) -> Redirect {
    Redirect::temporary(&format!("/{}", state.page))
}

async fn serve_file(State(state): State<AppState>, uri: Uri) -> Response {
    let Some(path) = resolve_request_path(&state.root, uri.path()) else {
        debug!("Rejected {}", uri.path());
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, content_type(&path))],
            Body::from(bytes),
        )
            .into_response(),
        Err(e) => {
            debug!("{}: {}", path.display(), e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Map a request path to a file under `root`.
///
/// Returns `None` for anything that is not a regular file inside `root`,
/// including `..` segments and symlinks that lead outside it.
fn resolve_request_path(root: &Path, request_path: &str) -> Option<PathBuf> {
    let decoded = decode_path(request_path)?;
    let relative = Path::new(decoded.trim_start_matches('/'));
    if decoded.contains('\\') || decoded.contains('\0') {
        return None;
    }
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }

    let candidate = root.join(relative).canonicalize().ok()?;
    (candidate.starts_with(root) && candidate.is_file()).then_some(candidate)
}

/// Decode `%XX` escapes; `None` when the result is not UTF-8.
///
/// Malformed escapes stay literal, so they can only name a file that does
/// not exist.
fn decode_path(s: &str) -> Option<String> {
    urlencoding::decode(s).ok().map(|d| d.into_owned())
}

fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "json" => "application/json",
        "js" => "text/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn served_dir() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("flashcards.html"), "<html></html>").unwrap();
        std::fs::write(dir.path().join("my deck.json"), "[]").unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    #[test]
    fn serves_files_inside_root() {
        let (_dir, root) = served_dir();
        assert_eq!(
            resolve_request_path(&root, "/flashcards.html"),
            Some(root.join("flashcards.html"))
        );
        assert_eq!(
            resolve_request_path(&root, "/my%20deck.json"),
            Some(root.join("my deck.json"))
        );
    }

    #[test]
    fn rejects_traversal() {
        let (_dir, root) = served_dir();
        assert_eq!(resolve_request_path(&root, "/../etc/passwd"), None);
        assert_eq!(resolve_request_path(&root, "/%2e%2e/etc/passwd"), None);
        assert_eq!(resolve_request_path(&root, "/..%5cetc"), None);
        assert_eq!(resolve_request_path(&root, "/missing.html"), None);
        assert_eq!(resolve_request_path(&root, "/"), None);
    }

    #[test]
    fn malformed_escapes_never_become_bytes() {
        assert_eq!(decode_path("/a%41").as_deref(), Some("/aA"));
        for raw in ["/a%+41", "/a%2", "/a%zz", "/a%-1"] {
            let decoded = decode_path(raw).unwrap();
            assert!(
                !decoded.chars().any(|c| c.is_control()),
                "{raw} decoded to {decoded:?}"
            );
        }
        assert_eq!(decode_path("/%ff%fe"), None);
    }

    #[test]
    fn malformed_escapes_are_not_served() {
        let (_dir, root) = served_dir();
        std::fs::write(root.join("a"), "x").unwrap();
        assert_eq!(resolve_request_path(&root, "/a%+41"), None);
        assert_eq!(resolve_request_path(&root, "/%00flashcards.html"), None);
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type(Path::new("x.HTML")), "text/html; charset=utf-8");
        assert_eq!(content_type(Path::new("deck.json")), "application/json");
        assert_eq!(content_type(Path::new("blob")), "application/octet-stream");
    }
}
