//! Assembles a vehicle from registered parts: concrete and interface-bound
//! services, a tagged variant, and bus-driven injection of a dashboard.

use std::sync::{Arc, Mutex};

use ferrule_core::injection::TargetAdapter;
use ferrule_core::{
    Container, CoreError, Injectable, Injected, Injector, Lifetime, MemberDescriptor, ScopeChain,
};

trait Horn: Send + Sync {
    fn sound(&self) -> &'static str;
}

#[derive(Default)]
struct AirHorn;
impl Horn for AirHorn {
    fn sound(&self) -> &'static str {
        "HONK"
    }
}

#[derive(Default)]
struct Engine {
    cylinders: u8,
}

#[derive(Default)]
struct Dashboard {
    engine: Option<Arc<Engine>>,
    horn: Option<Arc<dyn Horn>>,
}

impl Injectable for Dashboard {
    fn members(&self) -> Vec<MemberDescriptor> {
        vec![
            MemberDescriptor::new::<Engine>("engine").with_tag("v8").required(),
            MemberDescriptor::new::<dyn Horn>("horn").required(),
        ]
    }

    fn assign(&mut self, member: &str, value: Injected) {
        match member {
            "engine" => self.engine = value.concrete::<Engine>(),
            "horn" => self.horn = value.interface::<dyn Horn>(),
            _ => {}
        }
    }
}

fn main() -> Result<(), CoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let container = Arc::new(Container::new());
    container
        .register_factory(Lifetime::Singleton, || Ok(Engine { cylinders: 8 }))?
        .with_tag("v8")?;
    container
        .register::<AirHorn>(Lifetime::Singleton)?
        .as_implementation::<dyn Horn>(|h| h)?;

    // Injection on demand.
    let mut dashboard = Dashboard::default();
    let chain = ScopeChain::local(container.clone());
    Injector::new().inject(&mut dashboard, &chain)?;
    println!(
        "dashboard wired: {} cylinders, horn says {}",
        dashboard.engine.as_ref().map(|e| e.cylinders).unwrap_or(0),
        dashboard.horn.as_ref().map(|h| h.sound()).unwrap_or("-"),
    );

    // Injection driven by creation events on the bus.
    let late: Arc<Mutex<Dashboard>> = Arc::new(Mutex::new(Dashboard::default()));
    let target = late.clone();
    let adapter: TargetAdapter = Arc::new(move |event| {
        event
            .instance_of::<Engine>()
            .map(|_| target.clone() as Arc<Mutex<dyn Injectable + Send>>)
    });
    let fresh = Arc::new(Container::new());
    let _handle =
        Injector::new().follow_creations(fresh.bus(), Arc::new(ScopeChain::local(fresh.clone())), adapter)?;

    fresh
        .register_factory(Lifetime::Singleton, || Ok(Engine { cylinders: 6 }))?
        .with_tag("v8")?;
    fresh
        .register::<AirHorn>(Lifetime::Singleton)?
        .as_implementation::<dyn Horn>(|h| h)?;
    fresh.resolve::<Engine>(Some("v8"))?;

    let late = late.lock().map_err(|_| CoreError::lock_error("dashboard"))?;
    println!(
        "bus-wired dashboard: {} cylinders",
        late.engine.as_ref().map(|e| e.cylinders).unwrap_or(0),
    );

    Ok(())
}
