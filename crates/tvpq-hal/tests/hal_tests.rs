//! Integration tests for the Hardware Abstraction Layer

use std::fs;
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;
use tempfile::TempDir;
use tvpq_hal::mock::{MockDriver, MockPlatform};
use tvpq_hal::sysfs::{SysfsConfig, SysfsDriver};
use tvpq_hal::{
    CellKey, CellValue, ColorTemperature, ComponentColor, ComponentTunnel, Control, DriverSink,
    DriverWorker, ErrorKind, HdrType, NotificationBus, PqParameter, RgbChannel, SourceInput,
    VideoEvent, WbControl, error_code,
};

#[test]
fn test_mock_platforms() {
    for platform in MockPlatform::all() {
        let driver = MockDriver::new(*platform);
        assert_eq!(driver.name(), format!("mock-{}", platform.as_str()));

        for control in platform.unsupported() {
            assert!(!driver.supports(&control));
            let err = driver.apply(&control, &CellValue::Int(0)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::OperationNotSupported);
        }
    }

    assert_eq!(MockPlatform::from_name("OLED"), Some(MockPlatform::Oled));

    let driver = MockDriver::new(MockPlatform::Oled);
    assert_eq!(driver.platform(), MockPlatform::Oled);
    driver.state().write().unwrap().playback.hdr_type = HdrType::Dovi;
    assert_eq!(driver.playback().unwrap().hdr_type, HdrType::Dovi);
    assert!(MockPlatform::Reference.unsupported().is_empty());
}

#[test]
fn test_worker_over_sysfs_driver() {
    let root = TempDir::new().unwrap();
    for node in ["backlight", "contrast", "wb_warm_red_gain", "cms_cyan_luma"] {
        fs::write(root.path().join(node), "0").unwrap();
    }
    fs::write(root.path().join("max_brightness"), "200").unwrap();
    fs::write(root.path().join("source"), "HDMI").unwrap();
    fs::write(root.path().join("video_format"), "HLG").unwrap();

    let driver = SysfsDriver::new(SysfsConfig {
        root: root.path().to_path_buf(),
        ..SysfsConfig::default()
    })
    .unwrap();
    let worker = DriverWorker::spawn(Arc::new(driver), Duration::from_secs(1)).unwrap();
    assert_eq!(worker.name(), "sysfs");

    worker
        .apply(Control::pq(PqParameter::Backlight), CellValue::Int(100))
        .unwrap();
    worker
        .apply(
            Control::WhiteBalance {
                temperature: ColorTemperature::Warm,
                channel: RgbChannel::Red,
                control: WbControl::Gain,
            },
            CellValue::Int(1500),
        )
        .unwrap();
    worker
        .apply(
            Control::Cms {
                color: ComponentColor::Cyan,
                tunnel: ComponentTunnel::Luma,
            },
            CellValue::Int(22),
        )
        .unwrap();

    let read = |node: &str| fs::read_to_string(root.path().join(node)).unwrap();
    assert_eq!(read("backlight"), "200");
    assert_eq!(read("wb_warm_red_gain"), "1500");
    assert_eq!(read("cms_cyan_luma"), "22");

    let ctx = worker.playback().unwrap();
    assert_eq!(ctx.source, SourceInput::Hdmi);
    assert_eq!(ctx.hdr_type, HdrType::Hlg);

    assert!(worker.supports(Control::pq(PqParameter::Contrast)).unwrap());
    assert!(!worker.supports(Control::GammaTable).unwrap());
    let result = worker.apply(Control::pq(PqParameter::Hue), CellValue::Int(1));
    assert_eq!(error_code(&result), 2);
}

#[test]
fn test_worker_times_out_slow_driver() {
    let driver = MockDriver::new(MockPlatform::Reference);
    driver.set_apply_delay(Duration::from_millis(200));
    let worker = DriverWorker::spawn(Arc::new(driver.clone()), Duration::from_millis(20)).unwrap();
    assert_eq!(worker.timeout(), Duration::from_millis(20));

    let result = worker.apply(Control::pq(PqParameter::Tint), CellValue::Int(4));
    assert_eq!(error_code(&result), 1);
    assert!(result.unwrap_err().to_string().contains("timed out"));
}

#[test]
fn test_worker_after_shutdown() {
    let worker = DriverWorker::spawn(
        Arc::new(MockDriver::new(MockPlatform::Basic)),
        Duration::from_millis(100),
    )
    .unwrap();
    worker.shutdown();

    let err = worker.playback().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::General);
}

#[test]
fn test_bus_drives_mock_driver() {
    let driver = MockDriver::new(MockPlatform::Reference);
    let bus = NotificationBus::new().unwrap();
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);

    let sink = driver.clone();
    bus.register_video_format_change(move |format| {
        let dynamic = if format == HdrType::Sdr { 0 } else { 1 };
        let result = sink.apply(
            &Control::pq(PqParameter::DynamicContrast),
            &CellValue::Int(dynamic),
        );
        let _ = tx.lock().unwrap().send(result.is_ok());
    })
    .unwrap();

    let publisher = bus.publisher();
    publisher
        .publish(VideoEvent::FormatChanged(HdrType::Hdr10Plus))
        .unwrap();
    assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
    assert_eq!(
        driver.applied(&Control::pq(PqParameter::DynamicContrast)),
        Some(CellValue::Int(1))
    );
}

#[test]
fn test_cell_key_serialization() {
    let key = CellKey::new(
        SourceInput::Av,
        4,
        HdrType::Hdr10Plus,
        Control::WhiteBalance {
            temperature: ColorTemperature::User,
            channel: RgbChannel::Green,
            control: WbControl::Offset,
        },
    );

    let json = serde_json::to_string(&key).expect("Serialization failed");
    assert!(json.contains("\"AV\""));
    assert!(json.contains("\"HDR10PLUS\""));
    assert!(json.contains("\"white_balance\""));

    let deserialized: CellKey = serde_json::from_str(&json).expect("Deserialization failed");
    assert_eq!(key, deserialized);
    assert_eq!(key.to_string(), "AV/4/HDR10PLUS/wb_user_green_offset");
}
