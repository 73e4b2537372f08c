fn main() {
    // ESP-IDF link metadata is only meaningful when the espidf feature is on;
    // host-target test builds skip it.
    if std::env::var_os("CARGO_FEATURE_ESPIDF").is_some() {
        embuild::espidf::sysenv::output();
    }
}
