use candor::gc;
use candor::heap::root_stack::RootStack;
use candor::heap::Heap;
use candor::options::Options;
use candor::runtime;
use structopt::StructOpt;

fn main() {
    env_logger::init();

    let options = Options::from_args();
    let mut heap = Heap::new(options);
    let mut root = RootStack::new();

    let mark = root.mark();
    let greeting = runtime::new_string(&mut heap, &mut root, mark, b"Hello, World!");
    root.push(greeting);

    let obj = runtime::new_object(&mut heap, &mut root, root.len());
    root.push(obj);

    let key = runtime::new_string(&mut heap, &mut root, root.len(), b"greeting");
    root.push(key);
    if let Some(slot) = runtime::lookup_property(&mut heap, &mut root, root.len(), obj, key, true) {
        unsafe { slot.cast::<u64>().write(greeting.0) };
    }

    log::info!("heap bytes in use before collection: {}", heap.bytes_used());
    gc::collect_garbage(&mut heap, &mut root, mark);
    log::info!("heap bytes in use after collection: {}", heap.bytes_used());
}
