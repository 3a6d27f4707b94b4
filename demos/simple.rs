#[cfg(windows)]
fn main() {
    #[cfg(feature = "log")]
    colog::init();

    let session = unstick_keys::start(Default::default()).unwrap();

    // your main code ...
    session.keyboard_hook.join().unwrap();
}

#[cfg(not(windows))]
fn main() {
    eprintln!("this demo needs a Windows keyboard hook");
}
