//! Device probing through the device bridge (`adb`)
//!
//! Three commands make up the probe contract:
//! - `<bridge> devices` to enumerate
//! - `<bridge> -s <id> shell id` for root access
//! - `<bridge> -s <id> shell df -h` for overlay-mounted system partitions
//!
//! Every failure degrades to "empty" or `false` and is logged; the probe
//! never returns an error.

use std::path::PathBuf;
use std::time::Duration;

use devdeck_core::prelude::*;
use devdeck_core::{Device, DeviceStatus};

use crate::process::{CommandLine, ProcessRunner};

/// Marker in `id` output identifying a root shell
pub const ROOT_MARKER: &str = "uid=0(root)";

/// Filesystem type marker in `df` output
pub const OVERLAY_MARKER: &str = "overlay";

/// Mount points whose overlay mount counts as "remounted"
pub const OVERLAY_MOUNT_POINTS: [&str; 2] = ["/system", "/vendor"];

pub const DEFAULT_BRIDGE_PROGRAM: &str = "adb";

/// Per-command timeout for probe commands
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Device inspection operations
#[trait_variant::make(DeviceProbe: Send)]
pub trait LocalDeviceProbe {
    /// Currently attached devices in enumeration order
    async fn enumerate(&self) -> Vec<Device>;

    /// True iff the device's shell runs as root
    async fn check_rooted(&self, device_id: &str) -> bool;

    /// True iff `/system` or `/vendor` is mounted through an overlay
    async fn check_writable_overlay(&self, device_id: &str) -> bool;
}

/// Run both per-device checks concurrently
pub async fn probe_device<P: DeviceProbe>(probe: &P, device_id: &str) -> DeviceStatus {
    let (is_rooted, has_writable_overlay) = tokio::join!(
        probe.check_rooted(device_id),
        probe.check_writable_overlay(device_id)
    );
    DeviceStatus {
        is_rooted,
        has_writable_overlay,
    }
}

/// Parse `<bridge> devices` output
///
/// Daemon start-up chatter (`* daemon not running; starting now ...`) is
/// skipped, then the header line is dropped. Each remaining non-blank line
/// is `<id> <status> [extra fields]`; a line with only an id gets an empty
/// raw status.
pub fn parse_devices_output(output: &str) -> Vec<Device> {
    output
        .lines()
        .skip_while(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with('*')
        })
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let id = fields.next()?;
            let status = fields.next().unwrap_or("");
            Some(Device::new(id, status))
        })
        .collect()
}

pub fn is_rooted_output(output: &str) -> bool {
    output.contains(ROOT_MARKER)
}

pub fn has_overlay_mount(df_output: &str) -> bool {
    df_output.lines().any(|line| {
        line.contains(OVERLAY_MARKER)
            && OVERLAY_MOUNT_POINTS
                .iter()
                .any(|mount| line.contains(mount))
    })
}

/// Resolve the bridge program on `PATH`
pub fn locate_bridge(program: &str) -> Result<PathBuf> {
    which::which(program).map_err(|e| {
        debug!("Bridge lookup for '{}' failed: {}", program, e);
        Error::BridgeNotFound {
            program: program.to_string(),
        }
    })
}

/// [`DeviceProbe`] backed by bridge commands
#[derive(Debug, Clone)]
pub struct BridgeProbe {
    runner: ProcessRunner,
    program: String,
    /// Global arguments placed before every subcommand (e.g. `-P 5038`)
    base_args: Vec<String>,
    timeout: Duration,
}

impl Default for BridgeProbe {
    fn default() -> Self {
        Self::new(DEFAULT_BRIDGE_PROGRAM)
    }
}

impl BridgeProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            runner: ProcessRunner::default(),
            program: program.into(),
            base_args: Vec::new(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_base_args(mut self, args: Vec<String>) -> Self {
        self.base_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, args: &[&str]) -> CommandLine {
        CommandLine::program(
            self.program.clone(),
            self.base_args
                .iter()
                .map(String::as_str)
                .chain(args.iter().copied()),
        )
    }

    /// Stdout of a bridge command, or `None` on spawn error / timeout
    async fn run(&self, args: &[&str]) -> Option<String> {
        let command = self.command(args);
        match self.runner.capture(&command, self.timeout).await {
            Ok(output) => {
                if !output.success() {
                    debug!(
                        "'{}' exited with {:?}: {}",
                        command,
                        output.code,
                        output.stderr.trim()
                    );
                }
                Some(output.stdout)
            }
            Err(e) => {
                warn!("Probe command '{}' failed: {}", command, e);
                None
            }
        }
    }
}

impl DeviceProbe for BridgeProbe {
    async fn enumerate(&self) -> Vec<Device> {
        let devices = self
            .run(&["devices"])
            .await
            .map(|output| parse_devices_output(&output))
            .unwrap_or_default();
        debug!("Enumerated {} device(s)", devices.len());
        devices
    }

    async fn check_rooted(&self, device_id: &str) -> bool {
        self.run(&["-s", device_id, "shell", "id"])
            .await
            .is_some_and(|output| is_rooted_output(&output))
    }

    async fn check_writable_overlay(&self, device_id: &str) -> bool {
        self.run(&["-s", device_id, "shell", "df", "-h"])
            .await
            .is_some_and(|output| has_overlay_mount(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdeck_core::ConnectionStatus;

    #[test]
    fn test_parse_header_only() {
        assert!(parse_devices_output("List of devices attached\n").is_empty());
        assert!(parse_devices_output("List of devices attached\n\n").is_empty());
        assert!(parse_devices_output("").is_empty());
    }

    #[test]
    fn test_parse_single_device() {
        let devices = parse_devices_output("List of devices attached\ndeviceA\tdevice\n");
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "deviceA");
        assert_eq!(devices[0].raw_status, "device");
        assert_eq!(devices[0].status, ConnectionStatus::Online);
    }

    #[test]
    fn test_parse_mixed_statuses_in_order() {
        let output = "List of devices attached\n\
                      emulator-5554\tdevice\n\
                      R58M123\tunauthorized\n\
                      10.0.0.2:5555\toffline\n\
                      lonely\n";
        let devices = parse_devices_output(output);
        let ids: Vec<_> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["emulator-5554", "R58M123", "10.0.0.2:5555", "lonely"]);
        assert_eq!(devices[1].status, ConnectionStatus::Unauthorized);
        assert_eq!(devices[2].status, ConnectionStatus::Offline);
        assert_eq!(devices[3].status, ConnectionStatus::Unknown);
        assert_eq!(devices[3].raw_status, "");
    }

    #[test]
    fn test_parse_skips_daemon_startup_noise() {
        let output = "* daemon not running; starting now at tcp:5037\n\
                      * daemon started successfully\n\
                      List of devices attached\n\
                      abc\tdevice\n";
        let devices = parse_devices_output(output);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "abc");
    }

    #[test]
    fn test_parse_long_format_ignores_extra_fields() {
        let output = "List of devices attached\n\
                      abc            device usb:1-1 product:x model:Pixel_7\n";
        let devices = parse_devices_output(output);
        assert_eq!(devices[0].raw_status, "device");
    }

    #[test]
    fn test_is_rooted_output() {
        assert!(is_rooted_output(
            "uid=0(root) gid=0(root) groups=0(root) context=u:r:su:s0"
        ));
        assert!(!is_rooted_output("uid=2000(shell) gid=2000(shell)"));
        assert!(!is_rooted_output(""));
    }

    #[test]
    fn test_has_overlay_mount() {
        let remounted = "Filesystem      Size  Used Avail Use% Mounted on\n\
                         /dev/block/dm-0 1.0G  1.0G     0 100% /\n\
                         overlay         5.0G  1.0G  4.0G  20% /system\n";
        assert!(has_overlay_mount(remounted));

        let vendor = "overlay 5.0G 1.0G 4.0G 20% /vendor\n";
        assert!(has_overlay_mount(vendor));

        let elsewhere = "overlay 5.0G 1.0G 4.0G 20% /data\n";
        assert!(!has_overlay_mount(elsewhere));

        let split_across_lines = "overlay 5.0G\n/dev/block/dm-1 /system\n";
        assert!(!has_overlay_mount(split_across_lines));
    }

    #[cfg(unix)]
    fn fake_bridge(dir: &std::path::Path) -> BridgeProbe {
        let script = dir.join("fake-adb.sh");
        std::fs::write(
            &script,
            r#"case "$1" in
  devices)
    printf 'List of devices attached\nrooted\tdevice\nplain\tdevice\n'
    ;;
  -s)
    case "$2:$4" in
      rooted:id) echo 'uid=0(root) gid=0(root)' ;;
      rooted:df) echo 'overlay 5.0G 1.0G 4.0G 20% /system' ;;
      plain:id) echo 'uid=2000(shell) gid=2000(shell)' ;;
      plain:df) echo '/dev/block/dm-0 1.0G 1.0G 0 100% /system' ;;
      *) echo "error: device '$2' not found" >&2; exit 1 ;;
    esac
    ;;
esac
"#,
        )
        .unwrap();

        // Run through `sh <script>` so the script never needs the exec bit.
        BridgeProbe::new("sh").with_base_args(vec![script.to_string_lossy().into_owned()])
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bridge_probe_against_fake_bridge() {
        let dir = tempfile::tempdir().unwrap();
        let probe = fake_bridge(dir.path());

        let devices = DeviceProbe::enumerate(&probe).await;
        let ids: Vec<_> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["rooted", "plain"]);

        let status = probe_device(&probe, "rooted").await;
        assert!(status.is_rooted);
        assert!(status.has_writable_overlay);

        let status = probe_device(&probe, "plain").await;
        assert!(!status.is_rooted);
        assert!(!status.has_writable_overlay);

        assert!(!DeviceProbe::check_rooted(&probe, "missing").await);
    }

    #[tokio::test]
    async fn test_missing_bridge_degrades_to_defaults() {
        let probe = BridgeProbe::new("devdeck-no-such-bridge");
        assert!(DeviceProbe::enumerate(&probe).await.is_empty());
        assert!(!DeviceProbe::check_rooted(&probe, "abc").await);
        assert!(!DeviceProbe::check_writable_overlay(&probe, "abc").await);
    }

    #[test]
    fn test_locate_missing_bridge() {
        let err = locate_bridge("devdeck-no-such-bridge").unwrap_err();
        assert!(matches!(err, Error::BridgeNotFound { .. }));
    }
}
