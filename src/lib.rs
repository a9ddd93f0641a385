pub mod app;
pub mod camera;
pub mod config;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod session;
pub mod splash;
pub mod worker;

#[cfg(test)]
mod testing;

#[cfg(target_os = "android")]
#[no_mangle]
fn android_main(app: slint::android::AndroidApp) {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Info)
            .with_tag("uvc_camera"),
    );
    if let Err(err) = slint::android::init(app.clone()) {
        log::error!("slint init failed: {err}");
        return;
    }
    if let Err(err) = app::run(app) {
        log::error!("{err:?}");
    }
}
