// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lines of the legacy sysfs GPIO interface

use std::{
    fs::{self, File, OpenOptions},
    io,
    os::unix::fs::FileExt as _,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::io::{unix::AsyncFd, Interest};

use super::{Gpio, InputLine, Level, OutputLine, PinId, SetupError};

pub const DEFAULT_ROOT: &str = "/sys/class/gpio";

/// Driver for `/sys/class/gpio` or a directory with the same layout.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl SysfsGpio {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Gpio for SysfsGpio {
    fn claim_input(&self, pin: PinId) -> Result<Box<dyn InputLine>, SetupError> {
        let exported = ExportedPin::export(&self.root, pin)?;
        exported.configure("edge", "both")?;
        exported.configure("direction", "in")?;
        let file = exported.open_value()?;
        // Consume the pending change notification of the fresh file.
        read_level(&file).map_err(SetupError::io(pin, "read value"))?;
        // SAFETY: The file is owned by the `AsyncFd` and stays open until
        // it is dropped.
        let value = unsafe { AsyncFd::register_with_interest(file, Interest::PRIORITY) }
            .map_err(|err| SetupError::io(pin, "register value")(err.into_parts().1))?;
        Ok(Box::new(SysfsInput {
            value,
            exported,
        }))
    }

    fn claim_output(&self, pin: PinId) -> Result<Box<dyn OutputLine>, SetupError> {
        let exported = ExportedPin::export(&self.root, pin)?;
        exported.configure("direction", "out")?;
        let value = exported.open_value()?;
        Ok(Box::new(SysfsOutput {
            value,
            exported,
        }))
    }
}

/// Unexports the pin when dropped.
#[derive(Debug)]
struct ExportedPin {
    root: PathBuf,
    pin: PinId,
}

impl ExportedPin {
    fn export(root: &Path, pin: PinId) -> Result<Self, SetupError> {
        fs::write(root.join("export"), pin.to_string())
            .map_err(SetupError::io(pin, "export (already in use?)"))?;
        log::debug!("Exported GPIO pin {pin}");
        Ok(Self {
            root: root.to_owned(),
            pin,
        })
    }

    fn attribute(&self, name: &str) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin)).join(name)
    }

    fn configure(&self, name: &'static str, value: &str) -> Result<(), SetupError> {
        fs::write(self.attribute(name), value).map_err(SetupError::io(self.pin, name))
    }

    fn open_value(&self) -> Result<File, SetupError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.attribute("value"))
            .map_err(SetupError::io(self.pin, "open value"))
    }
}

impl Drop for ExportedPin {
    fn drop(&mut self) {
        match fs::write(self.root.join("unexport"), self.pin.to_string()) {
            Ok(()) => log::debug!("Unexported GPIO pin {}", self.pin),
            Err(err) => log::error!("Unable to unexport pin {}: {err}", self.pin),
        }
    }
}

fn read_level(file: &File) -> io::Result<Level> {
    let mut buf = [0; 1];
    let len = file.read_at(&mut buf, 0)?;
    if len != 1 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "empty GPIO value",
        ));
    }
    Ok(Level::from_ascii(buf[0]))
}

struct SysfsInput {
    // Close the value file before unexporting the pin.
    value: AsyncFd<File>,
    exported: ExportedPin,
}

#[async_trait]
impl InputLine for SysfsInput {
    fn pin(&self) -> PinId {
        self.exported.pin
    }

    fn level(&mut self) -> io::Result<Level> {
        read_level(self.value.get_ref())
    }

    async fn edge(&mut self) -> io::Result<Level> {
        loop {
            let mut guard = self.value.ready(Interest::PRIORITY).await?;
            let ready = guard.ready();
            guard.clear_ready();
            if ready.is_priority() || ready.is_error() {
                return read_level(self.value.get_ref());
            }
        }
    }
}

struct SysfsOutput {
    value: File,
    exported: ExportedPin,
}

impl OutputLine for SysfsOutput {
    fn pin(&self) -> PinId {
        self.exported.pin
    }

    fn set_level(&mut self, level: Level) -> io::Result<()> {
        let len = self.value.write_at(&[level.as_ascii()], 0)?;
        if len != 1 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("unable to write {level} to GPIO value"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(pin: PinId) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let gpio = dir.path().join(format!("gpio{pin}"));
        fs::create_dir(&gpio).unwrap();
        fs::write(gpio.join("value"), "0\n").unwrap();
        dir
    }

    #[test]
    fn output_lifecycle() {
        let dir = fake_sysfs(17);
        let gpio = SysfsGpio::new(dir.path());
        let mut line = gpio.claim_output(17).unwrap();
        assert_eq!(line.pin(), 17);
        assert_eq!(fs::read_to_string(dir.path().join("export")).unwrap(), "17");
        assert_eq!(
            fs::read_to_string(dir.path().join("gpio17/direction")).unwrap(),
            "out"
        );
        line.set_level(Level::High).unwrap();
        assert!(fs::read_to_string(dir.path().join("gpio17/value"))
            .unwrap()
            .starts_with('1'));
        assert!(!dir.path().join("unexport").exists());
        drop(line);
        assert_eq!(
            fs::read_to_string(dir.path().join("unexport")).unwrap(),
            "17"
        );
    }

    #[test]
    fn missing_pin_directory() {
        let dir = tempfile::tempdir().unwrap();
        let gpio = SysfsGpio::new(dir.path());
        let err = gpio.claim_output(4).err().unwrap();
        assert!(matches!(
            err,
            SetupError::Io {
                pin: 4,
                action: "direction",
                ..
            }
        ));
        // The failed claim released the export.
        assert_eq!(fs::read_to_string(dir.path().join("unexport")).unwrap(), "4");
    }

    #[tokio::test]
    async fn input_needs_a_pollable_value() {
        // A regular file cannot be registered with the reactor.
        let dir = fake_sysfs(5);
        let gpio = SysfsGpio::new(dir.path());
        let err = gpio.claim_input(5).err().unwrap();
        assert!(matches!(
            err,
            SetupError::Io {
                pin: 5,
                action: "register value",
                ..
            }
        ));
        assert_eq!(
            fs::read_to_string(dir.path().join("gpio5/edge")).unwrap(),
            "both"
        );
        assert_eq!(fs::read_to_string(dir.path().join("unexport")).unwrap(), "5");
    }

    #[test]
    fn missing_export_file() {
        let gpio = SysfsGpio::new("/nonexistent/gpio");
        assert!(gpio.claim_input(4).is_err());
    }
}
