#[cfg(not(target_os = "android"))]
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    slint_uvc_camera::app::run()
}

#[cfg(target_os = "android")]
fn main() {}
