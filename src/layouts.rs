//! Fixed byte-layout view over an RDM GET/SET packet.
//!
//! `parameter_data_and_checksum` is a variable-length trailing field: its
//! first `parameter_data_length` bytes are the parameter data, followed by
//! the two big-endian checksum bytes.
binary_layout::binary_layout!(rdm_request_layout, BigEndian, {
    start_code: u8,
    sub_start_code: u8,
    message_length: u8,
    destination_uid: [u8; 6],
    source_uid: [u8; 6],
    transaction_number: u8,
    port_id_response_type: u8,
    message_count: u8,
    sub_device: u16,
    command_class: u8,
    parameter_id: u16,
    parameter_data_length: u8,
    parameter_data_and_checksum: [u8],
});
