//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use cms_runtime::config::{RuntimeConfig, SiteConfig, StaticConfigSource};
use cms_runtime::http::HttpServer;
use cms_runtime::identity::{InMemoryIdentityStore, Project, Role, User};
use cms_runtime::lifecycle::{RuntimeServices, ServerRuntime, ShutdownReport};

pub const ADMIN_KEY: &str = "test-admin-key";
pub const COOKIE: &str = "CMS_SESSION";

/// Configuration used by the integration tests.
pub fn test_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config.sites.sites.push(SiteConfig {
        host: "docs.example.org".to_string(),
        site_root: "/sites/docs/".to_string(),
    });
    config
}

/// Identity store with an editor, a reader and an account manager.
pub fn test_store(config: &RuntimeConfig) -> Arc<InMemoryIdentityStore> {
    let store = Arc::new(InMemoryIdentityStore::bootstrap(&config.identity, "admin"));
    store.add_project(Project::new("Offline Work"));

    let mut editor = User::new("/ou1/editor").with_role(Role::ElementAuthor, "/ou1/");
    editor.start_project = Some("Offline Work".to_string());
    editor.direct_edit_path = Some("/sites/default/news/".to_string());
    store.add_user(editor, Some("secret"));
    store.add_user(User::new("/ou1/reader"), Some("secret"));
    store.add_user(
        User::new("/ou1/manager").with_role(Role::AccountManager, "/ou1/"),
        Some("secret"),
    );
    store
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub runtime: Arc<ServerRuntime>,
    pub store: Arc<InMemoryIdentityStore>,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop serving and take the runtime offline.
    pub async fn stop(mut self) -> ShutdownReport {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap();
        }
        self.runtime.shutdown().await.unwrap()
    }
}

/// Start a runtime at SERVLET_ACCESS behind a real listener.
pub async fn start_server(config: RuntimeConfig) -> TestServer {
    start_server_at(config, true).await
}

/// Start a runtime; with `serve == false` it stays at SHELL_ACCESS.
pub async fn start_server_at(config: RuntimeConfig, serve: bool) -> TestServer {
    let store = test_store(&config);
    let runtime = Arc::new(
        ServerRuntime::new(
            Arc::new(StaticConfigSource::new(config.clone())),
            RuntimeServices::new(store.clone()),
        )
        .await
        .unwrap(),
    );
    runtime.initialize().await.unwrap();
    if serve {
        runtime.start_serving().await.unwrap();
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(runtime.clone(), &config);
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        server
            .run(listener, async move {
                let _ = stopped.await;
            })
            .await
            .unwrap();
    });

    TestServer {
        addr,
        runtime,
        store,
        stop: Some(stop),
        handle: Some(handle),
    }
}

/// Client that neither follows redirects nor keeps cookies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// `NAME=value` pair of the session cookie set by `response`, if any.
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .find(|pair| pair.starts_with(&format!("{COOKIE}=")))
        .map(str::to_string)
}

/// Log in through the form endpoint and return the cookie pair.
pub async fn login(server: &TestServer, user: &str, password: &str) -> String {
    let response = client()
        .post(server.url("/system/login"))
        .form(&[("username", user), ("password", password)])
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success(), "login of {user} failed");
    session_cookie(&response).unwrap()
}
