use crate::metrics;

// Block poller and event listener.
metrics! {
    group: relay_source,

    "Number of poll ticks executed for a cursor."
    counter   relay_poll_ticks{chain, asset, outcome} [],

    "Number of blocks whose logs were fully handled."
    counter   relay_blocks_advanced{chain, asset} [],

    "Next block to be inspected for a cursor."
    gauge     relay_cursor_block{chain, asset} [],

    "Number of logs fetched in a single block for a cursor."
    histogram_counter relay_block_logs{chain, asset} [0., 1., 2., 5., 10., 20., 50., 100.],

    "Number of subscription attach attempts made by the event listener."
    counter   relay_listener_attach{chain, asset, success} []
}

// Transfer processing and submission.
metrics! {
    group: relay_transfer,

    "Number of transfer events handled by the processor."
    counter   relay_events_processed{kind, path, outcome} [],

    "Time to submit a destination transaction and wait for its receipt."
    histogram_duration relay_submission{chain, call, success} [0.5, 1., 2., 5., 10., 15., 20., 30., 45., 60., 90., 120.],

    "Number of failed submission attempts."
    counter   relay_submission_failures{chain, call, class} [],

    "Number of transfers waiting in the replay backlog."
    gauge     relay_replay_backlog{} []
}

// Checkpoint persistence.
metrics! {
    group: relay_checkpoint,

    "Time to persist the checkpoint file."
    histogram_duration relay_checkpoint_flush{success} [],

    "Number of transfer ids currently remembered as processed."
    gauge     relay_processed_ids{} []
}

// Outbound JSON-RPC calls.
metrics! {
    group: rpc_client,

    "Time to execute a JSON-RPC request against a chain endpoint."
    histogram_duration rpc_client_request{chain, method, success} []
}
