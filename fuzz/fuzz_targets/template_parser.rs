#![no_main]
use libfuzzer_sys::fuzz_target;
use kafka_broker_config::template::{Template, TemplateContext};

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };

    let mut ctx = TemplateContext::new();
    ctx.insert("a", "1");
    ctx.insert("b", "");

    if let Ok(template) = Template::parse("fuzz", source) {
        template.render(&ctx).ok();
    }
});
