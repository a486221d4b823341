// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assembly of a module daemon from its configuration

use std::{future::Future, io, net::SocketAddr, path::PathBuf, sync::Arc};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::{
    config::{Config, ConfigError, GpioDriver},
    dispatch::RegisterDispatch,
    gpio::{Gpio, SimGpio, SysfsGpio},
    module::{
        control::ControlRegisters,
        counter::{self, CounterRegisters},
        sensor::{HumiditySensor, HumiditySensorKind, SensorRegisters},
        status::{self, StatusRegisters},
        ModuleKind,
    },
    monitor::{ControlMonitor, PulseMonitor, StatusMonitor, Timing},
    server::{self, Server, Terminated},
    store::{format_digit, SlotReader, SlotStore, StoreError},
    supervisor::{Shutdown, Supervisor},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open store {}: {source}", dir.display())]
    OpenStore {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Server(#[from] server::Error),

    #[error("Modbus server worker terminated unexpectedly")]
    ServerLost,
}

/// A module daemon that has not been started yet.
pub struct Daemon {
    config: Config,
    gpio: Option<Arc<dyn Gpio>>,
    humidity_sensors: Vec<(HumiditySensorKind, usize, Box<dyn HumiditySensor>)>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("config", &self.config)
            .field(
                "humidity_sensors",
                &self
                    .humidity_sensors
                    .iter()
                    .map(|(kind, index, _)| (kind, index))
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Daemon {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            gpio: None,
            humidity_sensors: Vec::new(),
        }
    }

    /// Use `gpio` instead of the configured driver.
    #[must_use]
    pub fn with_gpio(mut self, gpio: Arc<dyn Gpio>) -> Self {
        self.gpio = Some(gpio);
        self
    }

    /// Serve the readings of `sensor` as DHT or SHT sensor `index`
    /// (0 or 1) of a `sensor` module.
    #[must_use]
    pub fn with_humidity_sensor(
        mut self,
        kind: HumiditySensorKind,
        index: usize,
        sensor: impl HumiditySensor + 'static,
    ) -> Self {
        self.humidity_sensors.push((kind, index, Box::new(sensor)));
        self
    }

    /// Bind the server and spawn all workers.
    ///
    /// Must be called within a tokio runtime. No worker is spawned
    /// unless the server has been bound successfully.
    pub fn start(self) -> Result<Running, Error> {
        let Self {
            config,
            gpio,
            humidity_sensors,
        } = self;
        config.validate()?;
        let gpio: Arc<dyn Gpio> = match gpio {
            Some(gpio) => gpio,
            None => match config.gpio.driver {
                GpioDriver::Sysfs => Arc::new(SysfsGpio::new(&config.gpio.root)),
                GpioDriver::Simulation => {
                    log::warn!("Using simulated GPIO lines");
                    Arc::new(SimGpio::new())
                }
            },
        };
        let store = SlotStore::open(&config.store.dir).map_err(|source| Error::OpenStore {
            dir: config.store.dir.clone(),
            source,
        })?;
        let timing = config.timing.timing();
        let kind = config.module.kind;
        let slave = config.slave();

        let mut monitors = Vec::new();
        let dispatch = match kind {
            ModuleKind::Counter => counters(&config, &gpio, &store, timing, &mut monitors)?,
            ModuleKind::Status => status_lines(&config, &gpio, &store, timing, &mut monitors)?,
            ModuleKind::Control => control_lines(&config, &gpio, &store, timing, &mut monitors)?,
            ModuleKind::Sensor => humidity_sensors
                .into_iter()
                .fold(
                    SensorRegisters::new(config.sensor.one_wire.clone()),
                    |registers, (kind, index, sensor)| {
                        registers.with_humidity_sensor(kind, index, sensor)
                    },
                )
                .into_dispatch(),
        };

        let addr = config.socket_addr()?;
        let server = Server::bind(addr, slave, dispatch)?.max_reg(config.module.max_reg);
        let local_addr = server
            .local_addr()
            .map_err(|source| server::Error::Bind { addr, source })?;

        let mut supervisor = Supervisor::new();
        for (name, monitor) in monitors {
            supervisor.spawn(name, move |shutdown| monitor.run(shutdown));
        }
        let (exit_tx, exit_rx) = oneshot::channel();
        supervisor.spawn("modbus server", move |mut shutdown| async move {
            let result = server
                .serve_until(async move { shutdown.wait().await })
                .await;
            if let Err(err) = &result {
                log::error!("Modbus server failed: {err}");
            }
            // The receiver is gone after shutdown.
            let _ = exit_tx.send(result);
        });
        log::info!(
            "Started {kind} module {slave} on {local_addr} with {} worker(s)",
            supervisor.len()
        );

        Ok(Running {
            local_addr,
            supervisor,
            server_exit: exit_rx,
        })
    }
}

/// A channel monitor waiting to be spawned.
enum Monitor {
    Pulse(PulseMonitor),
    Status(StatusMonitor),
    Control(ControlMonitor),
}

impl Monitor {
    async fn run(self, shutdown: Shutdown) {
        match self {
            Self::Pulse(monitor) => monitor.run(shutdown).await,
            Self::Status(monitor) => monitor.run(shutdown).await,
            Self::Control(monitor) => monitor.run(shutdown).await,
        }
    }
}

fn counters(
    config: &Config,
    gpio: &Arc<dyn Gpio>,
    store: &SlotStore,
    timing: Timing,
    monitors: &mut Vec<(String, Monitor)>,
) -> Result<RegisterDispatch, Error> {
    for channel in config.counter.iter().filter(|channel| channel.pin != 0) {
        let pin = channel.pin;
        let first = store.writer(&counter::slot_name(pin, 1))?;
        let mut monitor = PulseMonitor::new(
            Arc::clone(gpio),
            pin,
            channel.polarity,
            channel.divisor,
            first,
        )
        .idle_poll(timing.pulse_idle_poll);
        if let Some(selector) = config.selector_path(channel) {
            let second = store.writer(&counter::slot_name(pin, 2))?;
            monitor = monitor.with_selector(SlotReader::from_path(selector), second);
        }
        monitors.push((format!("pulse counter {pin}"), Monitor::Pulse(monitor)));
    }
    let pins = config.counter.iter().map(|channel| channel.pin).collect();
    Ok(CounterRegisters::new(store.clone(), pins).into_dispatch())
}

fn status_lines(
    config: &Config,
    gpio: &Arc<dyn Gpio>,
    store: &SlotStore,
    timing: Timing,
    monitors: &mut Vec<(String, Monitor)>,
) -> Result<RegisterDispatch, Error> {
    for channel in config.status.iter().filter(|channel| channel.pin1 != 0) {
        let pins = (channel.pin1, channel.pin2);
        let slot = store.writer(&status::slot_name(pins.0, pins.1))?;
        let monitor = StatusMonitor::new(Arc::clone(gpio), pins, channel.polarity, slot)
            .timing(timing.status_settle, timing.status_rest);
        monitors.push((
            format!("status {}/{}", pins.0, pins.1),
            Monitor::Status(monitor),
        ));
    }
    let lines = config
        .status
        .iter()
        .map(|channel| (channel.pin1, channel.pin2))
        .collect();
    Ok(StatusRegisters::new(store.clone(), lines).into_dispatch())
}

fn control_lines(
    config: &Config,
    gpio: &Arc<dyn Gpio>,
    store: &SlotStore,
    timing: Timing,
    monitors: &mut Vec<(String, Monitor)>,
) -> Result<RegisterDispatch, Error> {
    let mut slots = Vec::with_capacity(config.control.len());
    for channel in &config.control {
        if channel.pin == 0 {
            slots.push(None);
            continue;
        }
        let writer = store.writer(&channel.slot)?;
        if !store.path(&channel.slot).exists() {
            writer.store(&format_digit(0))?;
        }
        slots.push(Some(writer));
        let monitor =
            ControlMonitor::new(Arc::clone(gpio), channel.pin, store.clone(), &channel.slot)
                .timing(timing.control_pulse, timing.control_rest);
        monitors.push((format!("control {}", channel.pin), Monitor::Control(monitor)));
    }
    Ok(ControlRegisters::new(slots).into_dispatch())
}

/// A started daemon.
#[derive(Debug)]
pub struct Running {
    local_addr: SocketAddr,
    supervisor: Supervisor,
    server_exit: oneshot::Receiver<Result<Terminated, server::Error>>,
}

impl Running {
    /// The address the Modbus server listens on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run until `signal` resolves or the server stops, then stop all
    /// workers.
    pub async fn run_until<X>(self, signal: X) -> Result<(), Error>
    where
        X: Future<Output = ()>,
    {
        let Self {
            supervisor,
            server_exit,
            ..
        } = self;
        let result = tokio::select! {
            () = signal => Ok(()),
            exit = server_exit => match exit {
                Ok(Ok(Terminated::Aborted)) => Ok(()),
                Ok(Err(err)) => Err(Error::Server(err)),
                Err(_) => Err(Error::ServerLost),
            },
        };
        supervisor.shutdown().await;
        result
    }

    /// Stop all workers.
    pub async fn shutdown(self) -> Result<(), Error> {
        self.run_until(std::future::ready(())).await
    }
}
