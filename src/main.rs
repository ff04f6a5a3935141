fn main() -> std::process::ExitCode {
    voice_capture_lib::run()
}
