//! Module loader tests: capability conflicts, hook ordering and isolation,
//! plus the built-in modules over a live server.

use reqwest::StatusCode;
use std::sync::{Arc, Mutex};

use simhost::codec::LlsdValue;
use simhost::config::ModulesConfig;
use simhost::modules::builtin::event_queue::{self, EventQueue};
use simhost::modules::builtin::region_info;
use simhost::modules::{ModuleCatalog, ModuleController, ModuleError, ModuleState, RegionModule, World};
use simhost::HandlerRegistries;

mod common;

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Default)]
enum OnAttach {
    #[default]
    Succeed,
    Fail,
    Panic,
    /// Register this capability without declaring it.
    Provide(&'static str),
}

#[derive(Clone)]
struct Probe {
    name: &'static str,
    capability: Option<&'static str>,
    on_attach: OnAttach,
    log: Log,
}

impl Probe {
    fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            capability: None,
            on_attach: OnAttach::Succeed,
            log: log.clone(),
        }
    }

    fn replacing(mut self, capability: &'static str) -> Self {
        self.capability = Some(capability);
        self
    }

    fn on_attach(mut self, on_attach: OnAttach) -> Self {
        self.on_attach = on_attach;
        self
    }

    fn record(&self, hook: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", self.name, hook));
    }
}

impl RegionModule for Probe {
    fn name(&self) -> &str {
        self.name
    }

    fn replaceable_capability(&self) -> Option<&str> {
        self.capability
    }

    fn initialise(&self, settings: &toml::Table) -> Result<(), ModuleError> {
        match settings.get("greeting").and_then(|v| v.as_str()) {
            Some(greeting) => self.record(&format!("initialise({})", greeting)),
            None => self.record("initialise"),
        }
        if settings.get("broken").and_then(|v| v.as_bool()) == Some(true) {
            return Err(ModuleError::initialise(self.name, "broken on purpose"));
        }
        Ok(())
    }

    fn add_region(&self, world: &Arc<World>) -> Result<(), ModuleError> {
        self.record("add_region");
        match &self.on_attach {
            OnAttach::Succeed => {}
            OnAttach::Fail => return Err(ModuleError::attach(self.name, world, "refused")),
            OnAttach::Panic => panic!("{} exploded", self.name),
            OnAttach::Provide(tag) => {
                world.register_capability(tag, self.name, Arc::new(self.name.to_string()));
            }
        }
        if let Some(capability) = self.capability {
            world.register_capability(capability, self.name, Arc::new(self.name.to_string()));
        }
        Ok(())
    }

    fn region_loaded(&self, _world: &Arc<World>) {
        self.record("region_loaded");
    }

    fn remove_region(&self, _world: &Arc<World>) {
        self.record("remove_region");
    }

    fn close(&self) {
        self.record("close");
    }
}

fn shared(catalog: ModuleCatalog, probe: Probe) -> ModuleCatalog {
    catalog.shared(move || probe.clone())
}

fn per_region(catalog: ModuleCatalog, probe: Probe) -> ModuleCatalog {
    catalog.per_region(move || probe.clone())
}

fn controller(catalog: ModuleCatalog, settings: ModulesConfig) -> ModuleController {
    let controller = ModuleController::new(catalog, settings);
    controller.initialize();
    controller.post_start();
    controller
}

fn world(name: &str) -> Arc<World> {
    Arc::new(World::new(name, Arc::new(HandlerRegistries::new())))
}

fn count(log: &Log, entry: &str) -> usize {
    log.lock().unwrap().iter().filter(|e| *e == entry).count()
}

fn names(controller: &ModuleController, world: &World) -> Vec<String> {
    controller
        .region_modules(world.id())
        .into_iter()
        .map(|info| info.name)
        .collect()
}

#[test]
fn test_first_capability_provider_wins() {
    let log = Log::default();
    let catalog = shared(ModuleCatalog::new(), Probe::new("sound_a", &log).replacing("sound"));
    let catalog = per_region(catalog, Probe::new("sound_b", &log).replacing("sound"));
    let controller = controller(catalog, ModulesConfig::default());

    let world = world("Alpha");
    let report = controller.add_region_to_modules(world.clone());

    assert_eq!(report.attached, vec!["sound_a"]);
    assert_eq!(report.skipped, vec!["sound_b"]);
    assert_eq!(names(&controller, &world), vec!["sound_a"]);
    assert_eq!(world.capability_owner("sound").as_deref(), Some("sound_a"));
    assert_eq!(count(&log, "sound_b:add_region"), 0);
    assert_eq!(
        world.request_interface::<String>("sound").as_deref().map(String::as_str),
        Some("sound_a")
    );
}

#[test]
fn test_undeclared_provider_preempts_deferred_module() {
    let log = Log::default();
    let catalog = per_region(
        ModuleCatalog::new(),
        Probe::new("fallback_sound", &log).replacing("sound"),
    );
    let catalog = per_region(
        catalog,
        Probe::new("full_audio", &log).on_attach(OnAttach::Provide("sound")),
    );
    let controller = controller(catalog, ModulesConfig::default());

    let world = world("Alpha");
    let report = controller.add_region_to_modules(world.clone());

    assert_eq!(report.attached, vec!["full_audio"]);
    assert_eq!(report.skipped, vec!["fallback_sound"]);
    assert_eq!(world.capability_owner("sound").as_deref(), Some("full_audio"));
}

#[test]
fn test_region_loaded_once_per_module_shared_first() {
    let log = Log::default();
    let catalog = shared(ModuleCatalog::new(), Probe::new("deferred_shared", &log).replacing("chat"));
    let catalog = shared(catalog, Probe::new("plain_shared", &log));
    let catalog = per_region(catalog, Probe::new("local", &log));
    let controller = controller(catalog, ModulesConfig::default());

    let world = world("Alpha");
    let report = controller.add_region_to_modules(world.clone());
    assert_eq!(report.attached, vec!["plain_shared", "local", "deferred_shared"]);

    let loaded: Vec<String> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.ends_with(":region_loaded"))
        .cloned()
        .collect();
    assert_eq!(
        loaded,
        vec![
            "plain_shared:region_loaded",
            "deferred_shared:region_loaded",
            "local:region_loaded"
        ]
    );

    // Every attach happens before any region_loaded.
    let entries = log.lock().unwrap().clone();
    let last_attach = entries.iter().rposition(|e| e.ends_with(":add_region")).unwrap();
    let first_loaded = entries.iter().position(|e| e.ends_with(":region_loaded")).unwrap();
    assert!(last_attach < first_loaded);

    assert!(controller
        .region_modules(world.id())
        .iter()
        .all(|info| info.state == ModuleState::Loaded));
}

#[test]
fn test_shared_modules_serve_every_region() {
    let log = Log::default();
    let catalog = shared(ModuleCatalog::new(), Probe::new("hub", &log));
    let catalog = per_region(catalog, Probe::new("local", &log));
    let controller = controller(catalog, ModulesConfig::default());

    controller.add_region_to_modules(world("Alpha"));
    controller.add_region_to_modules(world("Beta"));

    assert_eq!(count(&log, "hub:initialise"), 1);
    assert_eq!(count(&log, "hub:add_region"), 2);
    assert_eq!(count(&log, "local:initialise"), 2);

    let hub = controller
        .all_modules()
        .into_iter()
        .find(|info| info.name == "hub")
        .unwrap();
    assert_eq!(hub.regions, vec!["Alpha", "Beta"]);
}

#[test]
fn test_removal_closes_per_region_modules_only() {
    let log = Log::default();
    let catalog = shared(ModuleCatalog::new(), Probe::new("hub", &log).replacing("chat"));
    let catalog = per_region(catalog, Probe::new("local", &log));
    let controller = controller(catalog, ModulesConfig::default());

    let world = world("Alpha");
    controller.add_region_to_modules(world.clone());
    assert!(controller.remove_region_from_modules(world.id()));
    assert!(!controller.remove_region_from_modules(world.id()));

    assert_eq!(count(&log, "hub:remove_region"), 1);
    assert_eq!(count(&log, "local:remove_region"), 1);
    assert_eq!(count(&log, "local:close"), 1);
    assert_eq!(count(&log, "hub:close"), 0);
    assert!(!world.has_capability("chat"));
    assert!(controller.worlds().is_empty());

    controller.shutdown();
    assert_eq!(count(&log, "hub:close"), 1);
}

#[test]
fn test_failing_modules_do_not_stop_the_rest() {
    let log = Log::default();
    let catalog = shared(ModuleCatalog::new(), Probe::new("panicky", &log).on_attach(OnAttach::Panic));
    let catalog = per_region(catalog, Probe::new("grumpy", &log).on_attach(OnAttach::Fail));
    let catalog = per_region(catalog, Probe::new("steady", &log));
    let controller = controller(catalog, ModulesConfig::default());

    let world = world("Alpha");
    let report = controller.add_region_to_modules(world.clone());

    assert_eq!(report.attached, vec!["steady"]);
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed.iter().any(|e| e.contains("panicked") && e.contains("panicky")));
    assert_eq!(count(&log, "grumpy:close"), 1);
    assert_eq!(count(&log, "steady:region_loaded"), 1);
    assert_eq!(count(&log, "panicky:region_loaded"), 0);
}

#[test]
fn test_failed_attach_releases_claimed_capability() {
    let log = Log::default();
    let catalog = per_region(
        ModuleCatalog::new(),
        Probe::new("flaky_sound", &log)
            .replacing("sound")
            .on_attach(OnAttach::Fail),
    );
    let controller = controller(catalog, ModulesConfig::default());

    let world = world("Alpha");
    let report = controller.add_region_to_modules(world.clone());
    assert!(report.attached.is_empty());
    assert!(!world.has_capability("sound"));
}

#[test]
fn test_disabled_and_broken_modules_are_left_out() {
    let log = Log::default();
    let catalog = shared(ModuleCatalog::new(), Probe::new("off", &log));
    let catalog = shared(catalog, Probe::new("broken", &log));
    let catalog = shared(catalog, Probe::new("on", &log));

    let mut settings = ModulesConfig {
        disabled: vec!["off".to_string()],
        ..Default::default()
    };
    let mut broken = toml::Table::new();
    broken.insert("broken".to_string(), toml::Value::Boolean(true));
    settings.settings.insert("broken".to_string(), broken);

    let controller = ModuleController::new(catalog, settings);
    let errors = controller.initialize();
    assert_eq!(errors.len(), 1);

    let world = world("Alpha");
    let report = controller.add_region_to_modules(world.clone());
    assert_eq!(report.attached, vec!["on"]);
    assert_eq!(count(&log, "off:initialise"), 0);
    assert_eq!(count(&log, "broken:add_region"), 0);
}

#[test]
fn test_reload_configuration_reinitialises_live_modules() {
    let log = Log::default();
    let catalog = shared(ModuleCatalog::new(), Probe::new("hub", &log));
    let catalog = per_region(catalog, Probe::new("local", &log));
    let controller = controller(catalog, ModulesConfig::default());
    controller.add_region_to_modules(world("Alpha"));

    let mut settings = ModulesConfig::default();
    let mut table = toml::Table::new();
    table.insert("greeting".to_string(), toml::Value::String("hi".to_string()));
    settings.settings.insert("local".to_string(), table);

    let errors = controller.reload_configuration(settings);
    assert!(errors.is_empty());
    assert_eq!(count(&log, "local:initialise(hi)"), 1);
    assert_eq!(count(&log, "hub:initialise"), 2);
    assert!(controller.settings().settings.contains_key("local"));
}

#[test]
fn test_region_added_twice_is_ignored() {
    let log = Log::default();
    let catalog = per_region(ModuleCatalog::new(), Probe::new("local", &log));
    let controller = controller(catalog, ModulesConfig::default());

    let world = world("Alpha");
    controller.add_region_to_modules(world.clone());
    let report = controller.add_region_to_modules(world);
    assert!(report.attached.is_empty());
    assert_eq!(count(&log, "local:add_region"), 1);
}

#[tokio::test]
async fn test_event_queue_delivers_batches_over_poll() {
    let handle = common::start_server(ModuleCatalog::with_builtins(), &["Alpha"], |_| {}).await;
    let world = handle.modules().worlds().remove(0);
    let queue = world
        .request_interface::<EventQueue>(event_queue::CAPABILITY)
        .unwrap();
    queue.enqueue("ChatterBoxInvitation", LlsdValue::from("hello"));

    let url = common::url(&handle, &event_queue::events_path(world.id()));
    let res = common::client().post(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let batch = LlsdValue::parse(&res.bytes().await.unwrap()).unwrap();
    match batch.get("events") {
        Some(LlsdValue::Array(events)) => {
            assert_eq!(events.len(), 1);
            assert_eq!(
                events[0].get("message").and_then(LlsdValue::as_str),
                Some("ChatterBoxInvitation")
            );
        }
        other => panic!("unexpected events: {:?}", other),
    }

    // Nothing queued: the poll times out with the viewer's retry status.
    let res = common::client().post(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.text().await.unwrap(), "Upstream error: ");

    handle.stop().await;
}

#[tokio::test]
async fn test_poll_answers_when_event_arrives() {
    let handle = common::start_server(ModuleCatalog::with_builtins(), &["Alpha"], |config| {
        config.poll.timeout_secs = 5;
        config.timeouts.request_secs = 10;
    })
    .await;
    let world = handle.modules().worlds().remove(0);
    let queue = world
        .request_interface::<EventQueue>(event_queue::CAPABILITY)
        .unwrap();

    let url = common::url(&handle, &event_queue::events_path(world.id()));
    let pending = tokio::spawn(async move { common::client().post(&url).send().await.unwrap() });
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    queue.enqueue("TeleportFinish", LlsdValue::from("now"));

    let res = pending.await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    handle.stop().await;
}

#[tokio::test]
async fn test_region_info_and_runtime_regions() {
    let handle = common::start_server(ModuleCatalog::with_builtins(), &["Alpha"], |_| {}).await;

    let res = common::client()
        .get(common::url(&handle, &region_info::info_path("Alpha")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["name"], "Alpha");
    assert_eq!(body["capabilities"], serde_json::json!([event_queue::CAPABILITY]));

    // The event queue declares a capability, so it attaches in the deferred pass.
    let (beta, report) = handle.add_region("Beta");
    assert_eq!(report.attached, vec![region_info::MODULE_NAME, event_queue::MODULE_NAME]);
    assert!(handle.modules().remove_region_from_modules(beta.id()));

    let res = common::client()
        .get(common::url(&handle, &region_info::info_path("Beta")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    handle.stop().await;
}

#[tokio::test]
async fn test_admin_modules_requires_key() {
    let handle = common::start_server(ModuleCatalog::with_builtins(), &["Alpha"], |config| {
        config.admin.api_key = "sesame".to_string();
    })
    .await;
    let url = common::url(&handle, simhost::admin::MODULES_PATH);

    let res = common::client().get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = common::client().get(&url).bearer_auth("sesame").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["regions"][0]["name"], "Alpha");
    let modules = report["modules"].as_array().unwrap();
    let queue = modules
        .iter()
        .find(|m| m["name"] == event_queue::MODULE_NAME)
        .unwrap();
    assert_eq!(queue["kind"], "shared");
    assert_eq!(queue["regions"], serde_json::json!(["Alpha"]));

    handle.stop().await;
}
